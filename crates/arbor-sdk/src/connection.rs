use std::path::Path as FsPath;

use tracing::{debug, info, warn};

use arbor_engine::{Engine, OpenMode, SqliteEngine};
use arbor_logic::{Logic, VerifyReport};
use arbor_structure::Structure;
use arbor_types::{Condition, ObjectId, Path, Value};

use crate::access_log::AccessLog;
use crate::config::{ConnectionConfig, SQLITE};
use crate::error::{SdkError, SdkResult};
use crate::request::Request;
use crate::response::Response;

/// Transaction state of a connection.
#[derive(Debug, Default)]
enum TxState {
    /// Every call runs in its own transaction.
    #[default]
    Autocommit,
    /// Calls are queued and run together at commit.
    Async(Vec<Request>),
    /// The engine transaction is open and calls run immediately.
    Sync,
}

/// A connection to one Arbor database.
///
/// Without an explicit transaction every call commits on its own. Inside
/// [`begin_async`](Self::begin_async) calls return [`Response::Queued`]
/// and [`commit`](Self::commit) returns the real responses in call order.
/// Inside [`begin_sync`](Self::begin_sync) calls run immediately; any
/// failure rolls the transaction back and ends it.
pub struct Connection {
    engine: Box<dyn Engine>,
    state: TxState,
    access_log: AccessLog,
}

impl Connection {
    /// Open the database described by `config`.
    pub fn connect(config: &ConnectionConfig) -> SdkResult<Self> {
        let engine: Box<dyn Engine> = match config.engine.as_str() {
            SQLITE => Box::new(match &config.path {
                Some(path) => SqliteEngine::open(path, config.open_mode)?,
                None => SqliteEngine::open_in_memory()?,
            }),
            other => return Err(SdkError::UnknownEngine(other.to_string())),
        };
        Structure::new(engine.as_ref()).initialize()?;
        info!(engine = engine.name(), "connection ready");
        Ok(Self {
            engine,
            state: TxState::default(),
            access_log: AccessLog::new(config.access_log_capacity),
        })
    }

    /// Open by engine tag; a missing `path` means an in-memory database.
    pub fn open(tag: &str, path: Option<&FsPath>, open_mode: OpenMode) -> SdkResult<Self> {
        Self::connect(&ConnectionConfig {
            engine: tag.to_string(),
            path: path.map(FsPath::to_path_buf),
            open_mode,
            ..ConnectionConfig::default()
        })
    }

    /// A private in-memory SQLite database.
    pub fn in_memory() -> SdkResult<Self> {
        Self::connect(&ConnectionConfig::default())
    }

    /// Close the connection, discarding any open transaction.
    pub fn close(mut self) -> SdkResult<()> {
        if self.in_transaction() {
            self.rollback()?;
        }
        debug!(engine = self.engine.name(), "connection closed");
        Ok(())
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        !matches!(self.state, TxState::Autocommit)
    }

    // ---- Transactions ----

    pub fn begin_async(&mut self) -> SdkResult<()> {
        self.require_no_transaction()?;
        self.state = TxState::Async(Vec::new());
        Ok(())
    }

    /// Open the engine transaction and run later calls immediately.
    ///
    /// A request that fails while running rolls the transaction back and
    /// ends it. Malformed input (a masked path where a concrete one is
    /// required, an empty key) is rejected while the request is built,
    /// before any engine work, and leaves the transaction open.
    pub fn begin_sync(&mut self) -> SdkResult<()> {
        self.require_no_transaction()?;
        self.engine.begin()?;
        self.state = TxState::Sync;
        Ok(())
    }

    /// Finish the active transaction. An asynchronous transaction runs its
    /// queue now and returns one response per queued call; a synchronous
    /// one returns nothing.
    pub fn commit(&mut self) -> SdkResult<Vec<Response>> {
        match std::mem::take(&mut self.state) {
            TxState::Autocommit => Err(SdkError::NoTransaction),
            TxState::Async(queue) => self.run_batch(queue),
            TxState::Sync => {
                if let Err(err) = self.engine.commit() {
                    return Err(self.abort("commit", err.into()));
                }
                Ok(Vec::new())
            }
        }
    }

    pub fn rollback(&mut self) -> SdkResult<()> {
        match std::mem::take(&mut self.state) {
            TxState::Autocommit => Err(SdkError::NoTransaction),
            TxState::Async(queue) => {
                debug!(discarded = queue.len(), "queued requests discarded");
                Ok(())
            }
            TxState::Sync => {
                self.engine.rollback()?;
                Ok(())
            }
        }
    }

    fn require_no_transaction(&self) -> SdkResult<()> {
        if self.in_transaction() {
            Err(SdkError::TransactionActive)
        } else {
            Ok(())
        }
    }

    // ---- Execution ----

    /// Run, queue or autocommit one request depending on the transaction
    /// state.
    pub fn execute(&mut self, request: Request) -> SdkResult<Response> {
        if let TxState::Async(queue) = &mut self.state {
            queue.push(request);
            return Ok(Response::Queued);
        }
        if matches!(self.state, TxState::Sync) {
            return match self.apply(&request) {
                Ok(response) => Ok(response),
                Err(err) => {
                    self.state = TxState::Autocommit;
                    Err(self.abort(request.kind_name(), err))
                }
            };
        }
        let mut responses = self.run_batch(vec![request])?;
        responses.pop().ok_or(SdkError::UnexpectedResponse {
            expected: "response",
            found: "nothing",
        })
    }

    /// Run `requests` in order inside one engine transaction.
    fn run_batch(&mut self, requests: Vec<Request>) -> SdkResult<Vec<Response>> {
        self.engine.begin()?;
        let mut responses = Vec::with_capacity(requests.len());
        for request in &requests {
            match self.apply(request) {
                Ok(response) => responses.push(response),
                Err(err) => return Err(self.abort(request.kind_name(), err)),
            }
        }
        if let Err(err) = self.engine.commit() {
            return Err(self.abort("commit", err.into()));
        }
        debug!(requests = requests.len(), "transaction committed");
        Ok(responses)
    }

    /// Roll back after `step` failed and hand back its error.
    ///
    /// A failed `COMMIT` may leave the engine transaction open, so the
    /// rollback is issued whenever one is still active.
    fn abort(&mut self, step: &str, err: SdkError) -> SdkError {
        warn!(step, error = %err, "request failed, rolling back");
        if self.engine.in_transaction() {
            if let Err(rollback) = self.engine.rollback() {
                warn!(error = %rollback, "rollback failed");
            }
        }
        err
    }

    fn apply(&mut self, request: &Request) -> SdkResult<Response> {
        let logic = Logic::new(self.engine.as_ref());
        let response = match request {
            Request::Create { fields } => Response::Created(logic.create(fields)?),
            Request::Modify {
                id,
                path,
                fields,
                remove_conflicts,
            } => {
                logic.modify(*id, path, fields, *remove_conflicts)?;
                Response::Done
            }
            Request::Insert {
                id,
                target,
                groups,
                remove_conflicts,
            } => {
                logic.insert(*id, target, groups, *remove_conflicts)?;
                Response::Done
            }
            Request::Delete { id, paths } => {
                logic.delete(*id, paths)?;
                Response::Done
            }
            Request::Read { id, path, masks } => {
                Response::Value(logic.read(*id, path.as_ref(), masks)?)
            }
            Request::Search { condition } => Response::Ids(logic.search(condition.as_ref())?),
            Request::ObjectExists { id } => Response::Exists(logic.object_exists(*id)?),
            Request::Dump => Response::Dump(logic.dump()?),
            Request::Repair => Response::Repaired(logic.repair()?),
            Request::Verify => Response::Verified(logic.verify()?),
        };

        match (request, &response) {
            (_, Response::Created(id)) => self.access_log.touch(*id),
            (Request::Delete { id, paths }, _) if paths.is_empty() || paths.iter().any(Path::is_root) => {
                self.access_log.forget(*id)
            }
            (Request::ObjectExists { .. }, _) => {}
            _ => {
                if let Some(id) = request.object() {
                    self.access_log.touch(id);
                }
            }
        }
        Ok(response)
    }

    // ---- Documents ----

    /// Store `value` (placed at `path` when given) as a new object.
    pub fn create(&mut self, value: &Value, path: Option<&Path>) -> SdkResult<Response> {
        self.execute(Request::create(value, path)?)
    }

    /// Write `value` at `path`. With `remove_conflicts` the old subtree is
    /// replaced and containers of the wrong kind are removed instead of
    /// failing.
    pub fn modify(
        &mut self,
        id: ObjectId,
        path: &Path,
        value: &Value,
        remove_conflicts: bool,
    ) -> SdkResult<Response> {
        self.execute(Request::modify(id, path, value, remove_conflicts)?)
    }

    pub fn insert(
        &mut self,
        id: ObjectId,
        target: &Path,
        value: &Value,
        remove_conflicts: bool,
    ) -> SdkResult<Response> {
        self.execute(Request::insert(id, target, value, remove_conflicts)?)
    }

    pub fn insert_many(
        &mut self,
        id: ObjectId,
        target: &Path,
        values: &[Value],
        remove_conflicts: bool,
    ) -> SdkResult<Response> {
        self.execute(Request::insert_many(id, target, values, remove_conflicts)?)
    }

    /// Delete `path`, or the whole object when `None`.
    pub fn delete(&mut self, id: ObjectId, path: Option<&Path>) -> SdkResult<Response> {
        self.execute(Request::delete(id, path))
    }

    pub fn delete_many(&mut self, id: ObjectId, paths: &[Path]) -> SdkResult<Response> {
        self.execute(Request::delete_many(id, paths))
    }

    /// The whole object, or the subtree at `path`.
    pub fn read(&mut self, id: ObjectId, path: Option<&Path>) -> SdkResult<Response> {
        self.execute(Request::read(id, path, &[]))
    }

    pub fn read_by_mask(&mut self, id: ObjectId, mask: &Path) -> SdkResult<Response> {
        self.execute(Request::read(id, None, std::slice::from_ref(mask)))
    }

    /// Union of several masks, each relative to `base` when given.
    pub fn read_by_masks(
        &mut self,
        id: ObjectId,
        base: Option<&Path>,
        masks: &[Path],
    ) -> SdkResult<Response> {
        self.execute(Request::read(id, base, masks))
    }

    pub fn search(&mut self, condition: Option<&Condition>) -> SdkResult<Response> {
        self.execute(Request::search(condition))
    }

    pub fn object_exists(&mut self, id: ObjectId) -> SdkResult<Response> {
        self.execute(Request::object_exists(id))
    }

    pub fn dump(&mut self) -> SdkResult<Response> {
        self.execute(Request::Dump)
    }

    // ---- Maintenance ----

    /// Rebuild the catalog and list-size cache from the field tables.
    pub fn repair(&mut self) -> SdkResult<Response> {
        self.execute(Request::Repair)
    }

    /// Check the storage invariants. Always runs immediately in its own
    /// read-only pass, outside any queue.
    pub fn verify(&mut self) -> SdkResult<VerifyReport> {
        Ok(Logic::new(self.engine.as_ref()).verify()?)
    }

    /// Recently touched objects with hit counts, most recent first.
    pub fn recent_objects(&self) -> Vec<(ObjectId, u64)> {
        self.access_log.recent()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("engine", &self.engine.name())
            .field("state", &self.state)
            .field("access_log", &self.access_log)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use arbor_types::path;
    use serde_json::json;

    fn doc(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn autocommit_round_trip() {
        let mut conn = Connection::in_memory().unwrap();
        let id = conn.create(&doc(json!({"a": [1, 2]})), None).unwrap().into_id().unwrap();
        assert!(conn.object_exists(id).unwrap().into_exists().unwrap());
        assert_eq!(
            conn.read(id, None).unwrap().into_value().unwrap(),
            doc(json!({"a": [1, 2]}))
        );
        assert!(!conn.in_transaction());
    }

    #[test]
    fn transaction_state_misuse() {
        let mut conn = Connection::in_memory().unwrap();
        assert_eq!(conn.commit().unwrap_err().kind(), ErrorKind::Facade);
        assert_eq!(conn.rollback().unwrap_err().kind(), ErrorKind::Facade);
        conn.begin_async().unwrap();
        assert!(matches!(conn.begin_sync(), Err(SdkError::TransactionActive)));
        conn.rollback().unwrap();
        conn.begin_sync().unwrap();
        assert!(matches!(conn.begin_async(), Err(SdkError::TransactionActive)));
        assert!(conn.commit().unwrap().is_empty());
    }

    #[test]
    fn unknown_engine_tag() {
        let err = Connection::open("postgres", None, OpenMode::default()).unwrap_err();
        assert!(matches!(err, SdkError::UnknownEngine(ref tag) if tag == "postgres"));
        assert_eq!(err.kind(), ErrorKind::Facade);
    }

    #[test]
    fn sync_failure_ends_transaction() {
        let mut conn = Connection::in_memory().unwrap();
        let id = conn.create(&doc(json!({"a": 1})), None).unwrap().into_id().unwrap();
        conn.begin_sync().unwrap();
        conn.modify(id, &path!["b"].unwrap(), &doc(json!(2)), false).unwrap();
        let err = conn.read(ObjectId::new(999), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Logic);
        assert!(!conn.in_transaction());
        assert_eq!(
            conn.read(id, None).unwrap().into_value().unwrap(),
            doc(json!({"a": 1}))
        );
    }

    #[test]
    fn access_log_tracks_touched_objects() {
        let mut conn = Connection::in_memory().unwrap();
        let a = conn.create(&doc(json!({"x": 1})), None).unwrap().into_id().unwrap();
        let b = conn.create(&doc(json!({"x": 2})), None).unwrap().into_id().unwrap();
        conn.read(a, None).unwrap();
        assert_eq!(conn.recent_objects(), vec![(a, 2), (b, 1)]);
        conn.delete(a, None).unwrap();
        assert_eq!(conn.recent_objects(), vec![(b, 1)]);
    }
}
