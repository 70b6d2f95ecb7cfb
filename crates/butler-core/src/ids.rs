//! Opaque prefixed identifiers for every persisted entity.
//!
//! Each id wraps a `Uuid::now_v7()` behind a `prefix_` string so rows are
//! time-sortable and the prefix alone identifies the entity kind in logs.

use std::fmt;
use uuid::Uuid;

macro_rules! prefixed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Mint a fresh, time-sortable id.
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, Uuid::now_v7()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

prefixed_id!(GuestId, "gst_");
prefixed_id!(ReservationId, "rsv_");
prefixed_id!(ConversationId, "conv_");
prefixed_id!(MessageId, "msg_");
prefixed_id!(TaskId, "tsk_");
prefixed_id!(RuleId, "rul_");
prefixed_id!(ExecutionId, "exe_");
prefixed_id!(AuditId, "aud_");
prefixed_id!(KnowledgeId, "kno_");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        assert!(GuestId::new().as_str().starts_with("gst_"));
        assert!(ConversationId::new().as_str().starts_with("conv_"));
        assert!(ExecutionId::new().as_str().starts_with("exe_"));
    }

    #[test]
    fn ids_round_trip_through_string() {
        let id = TaskId::new();
        let back = TaskId::from(id.as_str());
        assert_eq!(id, back);
    }
}
