//! Pure policy checks applied to model input and output.
//!
//! - [`guardrails`]: which paths may be modified and which generated code is refused
//! - [`secrets`]: credential leak detection in generated code
//! - [`sanitize`]: secret masking and truncation of logs before they reach the model
//!
//! Nothing here holds state or touches the filesystem.

pub mod guardrails;
pub mod sanitize;
pub mod secrets;

pub use guardrails::{check_output, check_path, PolicyVerdict};
pub use sanitize::{mask_secrets, prepare_logs, sanitize_logs, truncate_logs_smart, MAX_INPUT_BYTES};
pub use secrets::{scan_for_secrets, SecretFinding, SecretKind};
