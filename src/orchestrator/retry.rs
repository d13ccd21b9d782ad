//! Maps a validator [`RetryHint`] to altered fetch options for the
//! orchestrator's single permitted retry (spec §4.8 stage 6).

use std::time::Duration;

use crate::types::RetryHint;

const WAIT_LONGER_EXTRA_SETTLE: Duration = Duration::from_secs(5);

pub struct FetchOptions {
    pub force_browser: bool,
    pub extra_settle: Option<Duration>,
}

/// `switch-to-browser`, `paginate-forward`, and `re-authenticate` all force
/// the browser path with no extra settle; `wait-longer` additionally adds a
/// 5s settle on top of the browser path's own idle wait.
#[must_use]
pub fn altered_fetch_options(hint: RetryHint) -> FetchOptions {
    match hint {
        RetryHint::WaitLonger => FetchOptions {
            force_browser: true,
            extra_settle: Some(WAIT_LONGER_EXTRA_SETTLE),
        },
        RetryHint::SwitchToBrowser | RetryHint::PaginateForward | RetryHint::ReAuthenticate => {
            FetchOptions {
                force_browser: true,
                extra_settle: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_longer_adds_extra_settle() {
        let opts = altered_fetch_options(RetryHint::WaitLonger);
        assert!(opts.force_browser);
        assert_eq!(opts.extra_settle, Some(WAIT_LONGER_EXTRA_SETTLE));
    }

    #[test]
    fn every_other_hint_forces_browser_without_extra_settle() {
        for hint in [RetryHint::SwitchToBrowser, RetryHint::PaginateForward, RetryHint::ReAuthenticate] {
            let opts = altered_fetch_options(hint);
            assert!(opts.force_browser);
            assert_eq!(opts.extra_settle, None);
        }
    }
}
