mod common;

use cqlmap::{
    data::{Value, ValueKind},
    error::CompileError,
    fill::{
        FieldPath, ParamSource, RowFiller, compile_field_plan, compile_row_filler,
        compile_table_filler,
    },
};

use common::{Customer, CustomerBook, classes};

#[test]
fn add_row_resolves_the_single_adder() {
    let classes = classes();
    let plan = compile_table_filler("add(row)", &classes.book, &classes.customer).unwrap();
    assert_eq!(plan.method().name(), "add");
    assert!(matches!(plan.params(), [ParamSource::Row]));

    let mut book = classes.book.instantiate();
    let row: cqlmap::class::Instance = Box::new(Customer {
        id: 4,
        ..Customer::default()
    });
    plan.invoke_table(&mut *book, row, 0).unwrap();
    let book = book.downcast::<CustomerBook>().unwrap();
    assert_eq!(book.customers.len(), 1);
    assert_eq!(book.customers[0].id, 4);
}

#[test]
fn keyed_put_reads_the_key_from_the_row() {
    let classes = classes();
    let plan = compile_table_filler("put(row.id, row)", &classes.book, &classes.customer).unwrap();
    assert!(matches!(
        plan.params(),
        [ParamSource::RowField(path), ParamSource::Row] if path.path() == "id"
    ));

    let mut book = classes.book.instantiate();
    let row: cqlmap::class::Instance = Box::new(Customer {
        id: 42,
        ..Customer::default()
    });
    plan.invoke_table(&mut *book, row, 9).unwrap();
    let book = book.downcast::<CustomerBook>().unwrap();
    assert_eq!(book.by_id.len(), 1);
    assert_eq!(book.by_id[0].0, 42);
    assert_eq!(book.by_id[0].1.id, 42);
}

#[test]
fn row_ordinal_retries_as_int_overload() {
    let classes = classes();
    let plan = compile_table_filler("addAt(rowNo, row)", &classes.book, &classes.customer).unwrap();
    assert_eq!(plan.method().params()[0], ValueKind::Int);

    let mut book = classes.book.instantiate();
    plan.invoke_table(&mut *book, Box::new(Customer::default()), 5)
        .unwrap();
    let book = book.downcast::<CustomerBook>().unwrap();
    assert_eq!(book.positions[0].0, 5);
}

#[test]
fn table_filler_errors_are_reported_at_compile_time() {
    let classes = classes();
    let compile = |spec: &str| compile_table_filler(spec, &classes.book, &classes.customer);

    assert!(matches!(
        compile("append(row)"),
        Err(CompileError::UnknownOperation { name, arity: 1, .. }) if name == "append"
    ));
    assert!(matches!(
        compile("mark(rowNo)"),
        Err(CompileError::AmbiguousOverload { candidates: 2, .. })
    ));
    let plan = compile("mark(row.name)").unwrap();
    assert_eq!(plan.method().params(), [ValueKind::Text]);
    assert!(matches!(
        compile("mark(row.active)"),
        Err(CompileError::UnknownAccessor { path, .. }) if path == "active"
    ));
    assert!(matches!(
        compile("put(row, row)"),
        Err(CompileError::RowArgumentRepeated(_))
    ));
    assert!(matches!(
        compile("add(colValue)"),
        Err(CompileError::InvalidArgument { argument, .. }) if argument == "colValue"
    ));
    assert!(matches!(
        compile("add row"),
        Err(CompileError::InvalidSpec { .. })
    ));
}

#[test]
fn per_field_filler_compiles_setter_plans_lazily() {
    let classes = classes();
    let filler = compile_row_filler("setter(colValue)", &classes.customer).unwrap();
    assert!(matches!(filler, RowFiller::PerField));

    let plan = compile_field_plan("customer_id", &classes.customer).unwrap();
    assert!(plan.is_none(), "no setCustomerId on Customer");

    let plan = compile_field_plan("AGE", &classes.customer).unwrap().unwrap();
    assert_eq!(plan.method().name(), "setAge");
    assert_eq!(plan.target_kind(), &ValueKind::Int);
}

#[test]
fn row_filler_rejects_unknown_arguments() {
    let classes = classes();
    assert!(matches!(
        compile_row_filler("put(row)", &classes.customer),
        Err(CompileError::InvalidArgument { .. })
    ));
    assert!(matches!(
        compile_row_filler("put(colName, colValue)", &classes.customer),
        Err(CompileError::UnknownOperation { .. })
    ));
}

#[test]
fn nested_field_plans_create_the_nested_target() {
    let classes = classes();
    let plan = compile_field_plan("address.city", &classes.customer)
        .unwrap()
        .unwrap();
    assert_eq!(plan.nested().map(|nested| nested.property()), Some("address"));

    let mut row = classes.customer.instantiate();
    plan.invoke_field(&mut *row, Value::from("Oslo")).unwrap();
    let customer = row.downcast::<Customer>().unwrap();
    assert_eq!(
        customer.address.and_then(|address| address.city).as_deref(),
        Some("Oslo")
    );

    assert!(compile_field_plan("address.geo.lat", &classes.customer)
        .unwrap()
        .is_none());
    assert!(compile_field_plan("billing.city", &classes.customer)
        .unwrap()
        .is_none());
}

#[test]
fn null_values_do_not_grow_collections() {
    let classes = classes();
    let plan = compile_field_plan("orders.sku", &classes.customer)
        .unwrap()
        .unwrap();
    let mut row = classes.customer.instantiate();
    plan.invoke_field(&mut *row, Value::Null).unwrap();
    assert!(row.downcast_ref::<Customer>().unwrap().orders.is_empty());

    plan.invoke_field(&mut *row, Value::from("A-1")).unwrap();
    let qty = compile_field_plan("orders.qty", &classes.customer)
        .unwrap()
        .unwrap();
    qty.invoke_field(&mut *row, Value::Int(3)).unwrap();
    let customer = row.downcast::<Customer>().unwrap();
    assert_eq!(customer.orders.len(), 1);
    assert_eq!(customer.orders[0].sku.as_deref(), Some("A-1"));
    assert_eq!(customer.orders[0].qty, 3);
}

#[test]
fn field_paths_read_through_nested_objects() {
    let classes = classes();
    let path = FieldPath::resolve(&classes.customer, "address.city").unwrap();
    assert_eq!(path.kind(), &ValueKind::Text);
    assert_eq!(path.read(&Customer::default()).unwrap(), Value::Null);
    assert!(FieldPath::resolve(&classes.customer, "orders.sku").is_err());
}
