//! Best-effort CPU pinning for pipeline stages

use tracing::warn;

/// Pin the calling thread to `core_id`. Best-effort: logs and returns
/// false when the core does not exist or the platform refuses.
pub fn pin_to_core(core_id: usize) -> bool {
    let Some(core_ids) = core_affinity::get_core_ids() else {
        warn!("cannot enumerate CPU cores; affinity ignored");
        return false;
    };
    let Some(core) = core_ids.into_iter().find(|c| c.id == core_id) else {
        warn!(core_id, "requested core not present; affinity ignored");
        return false;
    };
    let pinned = core_affinity::set_for_current(core);
    if !pinned {
        warn!(core_id, "failed to set affinity");
    }
    pinned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_to_existing_core_is_best_effort() {
        // Core 0 exists everywhere we run; failure is allowed (containers
        // may restrict the mask) but must not panic.
        let _ = pin_to_core(0);
    }

    #[test]
    fn test_pin_to_absent_core_returns_false() {
        assert!(!pin_to_core(usize::MAX));
    }
}
