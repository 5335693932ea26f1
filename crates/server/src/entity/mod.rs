pub mod delivery_status;
pub mod email_request;
