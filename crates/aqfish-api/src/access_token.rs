use dashmap::DashMap;
use uuid::Uuid;

use aqfish_domain::ApplicationUid;

/// Single-use credential bundles handed out by `ApplicationResource.Access`
/// (§6). A token is consumed the first time it is redeemed (P7); a second
/// redemption fails even though the underlying Resource is untouched.
#[derive(Default)]
pub struct AccessTokenStore {
    issued: DashMap<Uuid, (ApplicationUid, bool)>,
}

impl AccessTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, application_uid: ApplicationUid) -> Uuid {
        let token = Uuid::new_v4();
        self.issued.insert(token, (application_uid, false));
        token
    }

    /// Redeems `token` exactly once. Returns the Application it grants access
    /// to, or `None` if unknown or already spent.
    pub fn redeem(&self, token: Uuid) -> Option<ApplicationUid> {
        let mut entry = self.issued.get_mut(&token)?;
        if entry.1 {
            return None;
        }
        entry.1 = true;
        Some(entry.0)
    }
}
