pub(super) fn client_app_id() -> &'static str {
    env!("CARGO_PKG_NAME")
}

pub(super) fn client_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub(crate) fn default_user_agent() -> String {
    format!("{}/{}", client_app_id(), client_app_version())
}
