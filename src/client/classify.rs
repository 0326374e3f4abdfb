//! Inspection of error codes embedded in successful responses
//!
//! Kafka reports most failures inside an otherwise-successful response body:
//! per-partition codes in produce/fetch/offset replies, a single code in
//! group replies. The classifier scans every code and reduces them to one
//! disposition. It is declarative: it decides the follow-up action but never
//! retries, and it never discards a code silently.

use crate::error::ErrorCode;
use crate::protocol::KafkaResponse;

/// The follow-up action for a routed response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No embedded errors
    Pass,
    /// A transient broker-side condition; worth retrying later
    RetryLater(ErrorCode),
    /// Leadership moved; the routing tables are stale and a metadata
    /// refresh should be scheduled
    RefreshMetadata,
    /// A code the caller must handle
    Escalate(ErrorCode),
}

impl Disposition {
    fn severity(&self) -> u8 {
        match self {
            Disposition::Pass => 0,
            Disposition::RetryLater(_) => 1,
            Disposition::RefreshMetadata => 2,
            Disposition::Escalate(_) => 3,
        }
    }

    fn merge(self, other: Disposition) -> Disposition {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// Reduce every embedded error code of `response` to one disposition
pub fn classify(response: &KafkaResponse) -> Disposition {
    codes(response)
        .into_iter()
        .map(disposition_for)
        .fold(Disposition::Pass, Disposition::merge)
}

fn disposition_for(code: i16) -> Disposition {
    match ErrorCode::from_i16(code) {
        ErrorCode::None => Disposition::Pass,
        ErrorCode::NotLeaderOrFollower => Disposition::RefreshMetadata,
        c if c.is_retriable() => Disposition::RetryLater(c),
        c => Disposition::Escalate(c),
    }
}

fn codes(response: &KafkaResponse) -> Vec<i16> {
    match response {
        KafkaResponse::Produce(r) => r
            .responses
            .iter()
            .flat_map(|t| t.partition_responses.iter().map(|p| p.error_code))
            .collect(),
        KafkaResponse::Fetch(r) => r
            .responses
            .iter()
            .flat_map(|t| t.partitions.iter().map(|p| p.error_code))
            .collect(),
        KafkaResponse::ListOffsets(r) => r
            .topics
            .iter()
            .flat_map(|t| t.partitions.iter().map(|p| p.error_code))
            .collect(),
        KafkaResponse::Metadata(r) => r
            .topics
            .iter()
            .flat_map(|t| {
                std::iter::once(t.error_code).chain(t.partitions.iter().map(|p| p.error_code))
            })
            .collect(),
        KafkaResponse::OffsetCommit(r) => r
            .topics
            .iter()
            .flat_map(|t| t.partitions.iter().map(|p| p.error_code))
            .collect(),
        KafkaResponse::OffsetFetch(r) => r
            .topics
            .iter()
            .flat_map(|t| t.partitions.iter().map(|p| p.error_code))
            .collect(),
        KafkaResponse::FindCoordinator(r) => vec![r.error_code],
        KafkaResponse::JoinGroup(r) => vec![r.error_code],
        KafkaResponse::Heartbeat(r) => vec![r.error_code],
        KafkaResponse::LeaveGroup(r) => vec![r.error_code],
        KafkaResponse::SyncGroup(r) => vec![r.error_code],
        KafkaResponse::DescribeGroups(r) => r.groups.iter().map(|g| g.error_code).collect(),
        KafkaResponse::ListGroups(r) => vec![r.error_code],
    }
}
