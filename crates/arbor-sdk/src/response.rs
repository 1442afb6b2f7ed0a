use arbor_logic::{RepairSummary, VerifyReport};
use arbor_types::{ObjectId, Value};

use crate::error::{SdkError, SdkResult};

/// Result of one request.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Created(ObjectId),
    Exists(bool),
    Ids(Vec<ObjectId>),
    Value(Value),
    Dump(Vec<(ObjectId, Value)>),
    Repaired(RepairSummary),
    Verified(VerifyReport),
    /// A modify, insert or delete finished.
    Done,
    /// The request was queued in an asynchronous transaction; its result
    /// comes back from `commit`.
    Queued,
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        pub fn $name(self) -> SdkResult<$ty> {
            match self {
                Response::$variant(inner) => Ok(inner),
                other => Err(SdkError::UnexpectedResponse {
                    expected: $expected,
                    found: other.kind_name(),
                }),
            }
        }
    };
}

impl Response {
    accessor!(into_id, Created, ObjectId, "created");
    accessor!(into_exists, Exists, bool, "exists");
    accessor!(into_ids, Ids, Vec<ObjectId>, "ids");
    accessor!(into_value, Value, Value, "value");
    accessor!(into_dump, Dump, Vec<(ObjectId, Value)>, "dump");
    accessor!(into_repair_summary, Repaired, RepairSummary, "repaired");
    accessor!(into_report, Verified, VerifyReport, "verified");

    pub fn is_queued(&self) -> bool {
        matches!(self, Response::Queued)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Response::Created(_) => "created",
            Response::Exists(_) => "exists",
            Response::Ids(_) => "ids",
            Response::Value(_) => "value",
            Response::Dump(_) => "dump",
            Response::Repaired(_) => "repaired",
            Response::Verified(_) => "verified",
            Response::Done => "done",
            Response::Queued => "queued",
        }
    }
}
