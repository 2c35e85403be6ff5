#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use cqlmap::class::{Arg, ClassDef};
use cqlmap::data::{EnumDef, EnumValue, Value, ValueKind};
use cqlmap::error::InvokeError;
use cqlmap::record::Record;
use rust_decimal::Decimal;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub city: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderLine {
    pub sku: Option<String>,
    pub qty: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: Option<String>,
    pub age: Option<i32>,
    pub active: bool,
    pub status: Option<EnumValue>,
    pub joined: Option<NaiveDate>,
    pub balance: Option<Decimal>,
    pub address: Option<Address>,
    pub orders: Vec<OrderLine>,
    pub tags: Vec<Tag>,
}

/// Table target with a few overloaded operations.
#[derive(Debug, Default)]
pub struct CustomerBook {
    pub customers: Vec<Customer>,
    pub by_id: Vec<(i64, Customer)>,
    pub positions: Vec<(i32, Customer)>,
}

pub struct Classes {
    pub book: Arc<ClassDef>,
    pub customer: Arc<ClassDef>,
    pub address: Arc<ClassDef>,
    pub order_line: Arc<ClassDef>,
    pub tag: Arc<ClassDef>,
}

pub fn status_enum() -> Arc<EnumDef> {
    EnumDef::new(
        "Status",
        [
            ("ACTIVE", "Active customer"),
            ("SUSPENDED", "On hold"),
            ("CLOSED", "Closed"),
        ],
    )
}

fn keyed_customer<K: cqlmap::data::FromValue>(
    method: &str,
    args: Vec<Arg>,
) -> Result<(K, Customer), InvokeError> {
    let mut args = args.into_iter();
    let key = args
        .next()
        .and_then(Arg::into_value)
        .ok_or_else(|| InvokeError::Message(format!("{method}: missing key")))?
        .extract::<K>()?;
    let customer = args
        .next()
        .and_then(Arg::into_object::<Customer>)
        .ok_or_else(|| InvokeError::Message(format!("{method}: missing customer")))?;
    Ok((key, customer))
}

pub fn classes() -> Classes {
    let address = ClassDef::builder::<Address>("Address")
        .setter("city", ValueKind::Text, |a: &mut Address, v: Option<String>| {
            a.city = v
        })
        .setter("zip", ValueKind::Text, |a: &mut Address, v: Option<String>| {
            a.zip = v
        })
        .getter("city", ValueKind::Text, |a: &Address| a.city.clone())
        .build();
    let order_line = ClassDef::builder::<OrderLine>("OrderLine")
        .setter("sku", ValueKind::Text, |o: &mut OrderLine, v: Option<String>| {
            o.sku = v
        })
        .setter("qty", ValueKind::Int, |o: &mut OrderLine, v: i32| o.qty = v)
        .build();
    let tag = ClassDef::builder::<Tag>("Tag")
        .setter("label", ValueKind::Text, |t: &mut Tag, v: Option<String>| {
            t.label = v
        })
        .build();
    let customer = ClassDef::builder::<Customer>("Customer")
        .setter("id", ValueKind::Long, |c: &mut Customer, v: i64| c.id = v)
        .primitive_getter("id", ValueKind::Long, |c: &Customer| c.id)
        .setter("name", ValueKind::Text, |c: &mut Customer, v: Option<String>| {
            c.name = v
        })
        .getter("name", ValueKind::Text, |c: &Customer| c.name.clone())
        .setter("age", ValueKind::Int, |c: &mut Customer, v: Option<i32>| {
            c.age = v
        })
        .getter("age", ValueKind::Int, |c: &Customer| c.age)
        .setter("active", ValueKind::Boolean, |c: &mut Customer, v: bool| {
            c.active = v
        })
        .setter(
            "status",
            ValueKind::Enum(status_enum()),
            |c: &mut Customer, v: Option<EnumValue>| c.status = v,
        )
        .setter("joined", ValueKind::Date, |c: &mut Customer, v: Option<NaiveDate>| {
            c.joined = v
        })
        .setter("balance", ValueKind::Decimal, |c: &mut Customer, v: Option<Decimal>| {
            c.balance = v
        })
        .nested(
            "address",
            &address,
            |c| c.address.as_ref(),
            |c| c.address.as_mut(),
            |c, a| c.address = Some(a),
        )
        .list_of("orders", &order_line, |c| &mut c.orders)
        .set_of("tags", &tag, |c| &mut c.tags)
        .build();
    let customer_kind = ValueKind::Object("Customer".into());
    let book = ClassDef::builder::<CustomerBook>("CustomerBook")
        .adder("add", &customer, |b: &mut CustomerBook, c: Customer| {
            b.customers.push(c)
        })
        .method(
            "put",
            vec![ValueKind::Long, customer_kind.clone()],
            |b: &mut CustomerBook, args: Vec<Arg>| {
                b.by_id.push(keyed_customer::<i64>("put", args)?);
                Ok(())
            },
        )
        .method(
            "addAt",
            vec![ValueKind::Int, customer_kind.clone()],
            |b: &mut CustomerBook, args: Vec<Arg>| {
                b.positions.push(keyed_customer::<i32>("addAt", args)?);
                Ok(())
            },
        )
        .method(
            "addAt",
            vec![ValueKind::Text, customer_kind.clone()],
            |_: &mut CustomerBook, _: Vec<Arg>| Err(InvokeError::Message("text overload".into())),
        )
        .method(
            "mark",
            vec![ValueKind::Text],
            |_: &mut CustomerBook, _: Vec<Arg>| Ok(()),
        )
        .method(
            "mark",
            vec![ValueKind::Boolean],
            |_: &mut CustomerBook, _: Vec<Arg>| Ok(()),
        )
        .build();
    Classes {
        book,
        customer,
        address,
        order_line,
        tag,
    }
}

/// A record with a single `n` node holding `properties`.
pub fn node(properties: &[(&str, Value)]) -> Record {
    Record::new().with_node("n", properties.iter().cloned())
}
