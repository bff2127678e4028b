// Bus subject names and the shared event-queue key.
//
// The per-worker subjects are derived from the worker id; both sides build
// them with the same helpers so the names never drift apart.

/// API server → brain, request/reply.
pub const CH_API_BRAIN: &str = "ch_api_brain";

/// Public registration subject every worker announces itself on.
pub const CH_PUBLIC_BRAIN: &str = "ch_brain";

/// Brain → resource manager commands.
pub const CH_BRAIN_RES: &str = "ch_brain_res";

/// Resource manager → brain responses.
pub const CH_RES_BRAIN: &str = "ch_res_brain";

/// Brain → notification fan-out.
pub const CH_NOTIFICATION: &str = "ch_notification";

/// Private worker → brain subject.
pub fn worker_to_brain(worker_id: &str) -> String {
    format!("ch_{worker_id}_brain")
}

/// Private brain → worker subject.
pub fn brain_to_worker(worker_id: &str) -> String {
    format!("ch_brain_{worker_id}")
}

/// Memory-store list the worker appends events to and the brain drains.
/// One producer (the worker), one consumer (the brain).
pub fn event_queue_key(worker_id: &str) -> String {
    format!("event:brain:{worker_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_subjects_embed_worker_id() {
        assert_eq!(worker_to_brain("w1"), "ch_w1_brain");
        assert_eq!(brain_to_worker("w1"), "ch_brain_w1");
        assert_eq!(event_queue_key("w1"), "event:brain:w1");
    }
}
