pub mod db;
pub mod errors;
pub mod helpers;
pub mod method_override;
pub mod query_params;
