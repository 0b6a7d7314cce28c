#![doc = include_str!("../README.md")]

pub mod infomodel;
pub mod message;
pub mod template;
mod tests;
pub mod types;

use serde::Serialize;

// Re-export the working surface for convenience
pub use infomodel::{
    IeList, InformationElement, clear_infomodel, for_spec, for_template_entry, spec_list,
    use_5103_default, use_iana_default, use_specfile,
};
pub use message::{DEFAULT_MTU, IPFIX_VERSION, MessageBuffer};
pub use template::{MIN_DATA_SET_ID, OPTIONS_SET_ID, TEMPLATE_SET_ID, Template};
pub use types::{FieldValue, IeType, VARLEN};

/// Errors the codec reports.
///
/// `EndOfMessage` is the one recoverable kind: the append was rolled back,
/// the buffer is still valid, and the caller finalizes the current message
/// and retries in the next one. `Malformed` is terminal for the buffer being
/// decoded. The remaining kinds surface caller mistakes unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IpfixError {
    /// The bytes being decoded violate the wire format: wrong version,
    /// truncation, a set or varlen prefix running past its bounds, or an
    /// inconsistent template.
    Malformed {
        /// Offset in octets where the violation was detected
        offset: usize,
        /// Description of what was being decoded
        context: String,
    },

    /// Appending would push the message past the MTU. The buffer is
    /// unchanged; finalize and retry in a fresh message.
    EndOfMessage {
        /// Octets the message would have occupied
        required: usize,
        /// The configured MTU
        available: usize,
    },

    /// An IESpec failed to parse, named no registered element, or declared a
    /// size its type cannot carry.
    InvalidSpec { spec: String, context: String },

    /// A record to be encoded lacks a value for a template element.
    MissingField { name: String },

    /// No template with this ID is known in the observation domain.
    TemplateNotFound {
        template_id: u16,
        observation_domain_id: u32,
    },

    /// The operation is not valid in the buffer's current state, e.g. an
    /// export before `begin_export`.
    WrongState {
        operation: &'static str,
        state: String,
    },

    /// A value handed to an encoder does not fit its element's type or
    /// declared length.
    IncompatibleValue { context: String },

    /// A stream adapter failed to read or write.
    Io { context: String },
}

impl std::fmt::Display for IpfixError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpfixError::Malformed { offset, context } => {
                write!(f, "Malformed message at offset {offset}: {context}")
            }
            IpfixError::EndOfMessage {
                required,
                available,
            } => {
                write!(
                    f,
                    "End of message: {required} octets needed, MTU is {available}"
                )
            }
            IpfixError::InvalidSpec { spec, context } => {
                write!(f, "Invalid IESpec {spec:?}: {context}")
            }
            IpfixError::MissingField { name } => {
                write!(f, "Record is missing a value for {name:?}")
            }
            IpfixError::TemplateNotFound {
                template_id,
                observation_domain_id,
            } => {
                write!(
                    f,
                    "No template {template_id} in observation domain {observation_domain_id}"
                )
            }
            IpfixError::WrongState { operation, state } => {
                write!(f, "Cannot {operation} while the buffer is {state}")
            }
            IpfixError::IncompatibleValue { context } => {
                write!(f, "Incompatible value: {context}")
            }
            IpfixError::Io { context } => {
                write!(f, "I/O error: {context}")
            }
        }
    }
}

impl std::error::Error for IpfixError {}
