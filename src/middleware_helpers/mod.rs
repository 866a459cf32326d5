pub mod admin_key;
pub mod request_id;

pub use admin_key::{require_admin_key, AdminKey, ADMIN_KEY_HEADER};
pub use request_id::request_id_middleware;
