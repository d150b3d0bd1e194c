use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::settings::try_handle,
    handlers::students::try_handle,
    handlers::staff::try_handle,
    handlers::results::try_handle,
    handlers::fees::try_handle,
    handlers::attendance::try_handle,
    handlers::certificates::try_handle,
    handlers::hostel::try_handle,
    handlers::calendar::try_handle,
    handlers::notifications::try_handle,
    handlers::promotion::try_handle,
    handlers::backup::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    for handler in HANDLERS {
        if let Some(resp) = handler(state, &req) {
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
