use crate::model::{DiscoveredAccount, FetchResult, ModelQuota};

use super::common;

/// Gemini CLI has no quota API; the account is reported as present with an
/// unknown quota.
pub fn fetch(account: &DiscoveredAccount) -> FetchResult {
    common::success(account, vec![ModelQuota::unknown("gemini-quota")], None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Credentials;

    #[test]
    fn always_succeeds_with_unknown_quota() {
        let acct = DiscoveredAccount::new("gemini-cli", "unknown", "/x", Credentials::new());
        let r = fetch(&acct);
        assert!(r.is_success());
        assert_eq!(r.data.models.len(), 1);
        assert_eq!(r.data.models[0].name, "gemini-quota");
        assert!(!r.data.models[0].is_known());
    }
}
