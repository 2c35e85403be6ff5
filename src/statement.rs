//! Statement execution seam: template substitution, driver call and result
//! mapping in one place. Query execution, connections and transactions are
//! the driver's business; this module only sequences the steps.

use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::{
    error::{DriverError, StatementError, TemplateError},
    record::Record,
    rows::{ResultMapper, TableResult},
    template::{PlaceholderTemplate, ValueSource},
};

pub type RecordStream = Box<dyn Iterator<Item = Record> + Send>;

/// Executes query text against a graph database.
pub trait QueryDriver: Send + Sync {
    fn execute_query(&self, text: &str) -> Result<RecordStream, DriverError>;

    fn is_connection_valid(&self) -> bool {
        true
    }
}

/// Receives every query text right before it is executed.
pub trait QueryLog: Send + Sync {
    fn log_executed_query(&self, text: &str);
}

/// [`QueryLog`] writing through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogQueryLog;

impl QueryLog for LogQueryLog {
    fn log_executed_query(&self, text: &str) {
        info!("Executing query: {text}");
    }
}

/// Driver replaying a fixed set of records for every query, remembering the
/// query texts it was given.
#[derive(Debug, Default)]
pub struct ReplayDriver {
    records: Vec<Record>,
    executed: Mutex<Vec<String>>,
    invalid: bool,
}

impl ReplayDriver {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// A driver whose connection check always fails.
    pub fn disconnected() -> Self {
        Self {
            invalid: true,
            ..Self::default()
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

impl QueryDriver for ReplayDriver {
    fn execute_query(&self, text: &str) -> Result<RecordStream, DriverError> {
        self.executed.lock().push(text.to_string());
        Ok(Box::new(self.records.clone().into_iter()))
    }

    fn is_connection_valid(&self) -> bool {
        !self.invalid
    }
}

pub struct Statement {
    template: PlaceholderTemplate,
    mapper: ResultMapper,
    log: Option<Arc<dyn QueryLog>>,
}

impl Statement {
    pub fn new(template: PlaceholderTemplate, mapper: ResultMapper) -> Self {
        Self {
            template,
            mapper,
            log: None,
        }
    }

    pub fn with_log(mut self, log: Arc<dyn QueryLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn template(&self) -> &PlaceholderTemplate {
        &self.template
    }

    pub fn mapper(&self) -> &ResultMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut ResultMapper {
        &mut self.mapper
    }

    pub fn render(&self, values: &dyn ValueSource) -> Result<String, TemplateError> {
        self.template.substitute(values)
    }

    pub fn query(
        &self,
        driver: &dyn QueryDriver,
        values: &dyn ValueSource,
    ) -> Result<TableResult, StatementError> {
        self.query_window(driver, values, 0, 0)
    }

    /// As [`Statement::query`], mapping only `window` records from
    /// `start_row` when `window > 0`.
    pub fn query_window(
        &self,
        driver: &dyn QueryDriver,
        values: &dyn ValueSource,
        start_row: usize,
        window: usize,
    ) -> Result<TableResult, StatementError> {
        if !driver.is_connection_valid() {
            return Err(DriverError::ConnectionInvalid.into());
        }
        let text = self.template.substitute(values)?;
        self.execute(driver, &text, start_row, window)
    }

    /// Executes `text` verbatim, bypassing the template.
    pub fn query_text(
        &self,
        driver: &dyn QueryDriver,
        text: &str,
    ) -> Result<TableResult, StatementError> {
        if !driver.is_connection_valid() {
            return Err(DriverError::ConnectionInvalid.into());
        }
        self.execute(driver, text, 0, 0)
    }

    fn execute(
        &self,
        driver: &dyn QueryDriver,
        text: &str,
        start_row: usize,
        window: usize,
    ) -> Result<TableResult, StatementError> {
        if let Some(log) = &self.log {
            log.log_executed_query(text);
        }
        debug!("Running statement (start_row={start_row}, window={window})");
        let records = driver.execute_query(text)?;
        Ok(self.mapper.materialize(records, start_row, window)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{builtin::builtin_mapper, data::Value};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl QueryLog for Recorder {
        fn log_executed_query(&self, text: &str) {
            self.0.lock().push(text.to_string());
        }
    }

    fn statement() -> Statement {
        let template = PlaceholderTemplate::parse("MATCH (n:`#label`) RETURN n").unwrap();
        Statement::new(template, builtin_mapper())
    }

    #[test]
    fn query_substitutes_logs_and_maps() {
        let recorder = Arc::new(Recorder::default());
        let statement = statement().with_log(recorder.clone());
        let driver = ReplayDriver::new(vec![
            Record::new().with_node("n", [("id", 1_i64)]),
            Record::new().with_node("n", [("id", 2_i64)]),
        ]);
        let values = HashMap::from([("label".to_string(), Value::from("Person"))]);
        let result = statement.query(&driver, &values).unwrap();
        assert_eq!(result.row_count, 2);
        assert_eq!(driver.executed(), ["MATCH (n:`Person`) RETURN n"]);
        assert_eq!(*recorder.0.lock(), ["MATCH (n:`Person`) RETURN n"]);
    }

    #[test]
    fn raw_text_bypasses_the_template() {
        let recorder = Arc::new(Recorder::default());
        let statement = statement().with_log(recorder.clone());
        let driver = ReplayDriver::new(vec![Record::new().with_node("n", [("id", 1_i64)])]);
        let result = statement
            .query_text(&driver, "MATCH (n:`#label`) RETURN n LIMIT 1")
            .unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(driver.executed(), ["MATCH (n:`#label`) RETURN n LIMIT 1"]);
        assert_eq!(*recorder.0.lock(), ["MATCH (n:`#label`) RETURN n LIMIT 1"]);

        let offline = ReplayDriver::disconnected();
        let err = statement.query_text(&offline, "RETURN 1").unwrap_err();
        assert!(matches!(err, StatementError::Driver(DriverError::ConnectionInvalid)));
        assert!(offline.executed().is_empty());
    }

    #[test]
    fn invalid_connection_stops_before_substitution() {
        let driver = ReplayDriver::disconnected();
        let err = statement()
            .query(&driver, &HashMap::<String, Value>::new())
            .unwrap_err();
        assert!(matches!(err, StatementError::Driver(DriverError::ConnectionInvalid)));
        assert!(driver.executed().is_empty());
    }

    #[test]
    fn missing_value_never_reaches_the_driver() {
        let driver = ReplayDriver::new(Vec::new());
        let err = statement()
            .query(&driver, &HashMap::<String, Value>::new())
            .unwrap_err();
        assert!(matches!(
            err,
            StatementError::Template(TemplateError::MissingValue { .. })
        ));
        assert!(driver.executed().is_empty());
    }
}
