pub const DISPATCH: &str = "/api/dispatch";
pub const METRICS: &str = "/api/metrics";

pub const TRACK_OPEN: &str = "/api/track/open";
pub const TRACK_CLICK: &str = "/api/track/click";
pub const TRACK_VIEW: &str = "/api/track/view";

pub const SUBSCRIBE: &str = "/api/subscribe";
pub const SUBSCRIBERS: &str = "/api/subscribers";
pub const SUBSCRIBER: &str = "/api/subscribers/:id";
pub const PREFERENCES: &str = "/api/onboarding/preferences";

pub const CONTENTS: &str = "/api/contents";

pub const ADMIN_LOGIN: &str = "/api/admin/login";
pub const ADMIN_LOGOUT: &str = "/api/admin/logout";
