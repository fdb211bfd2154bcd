mod guard;

pub use guard::{
    get_current_user, require_admin, require_any_role, CurrentUser, AUTH_COOKIE,
};
