//! Message codecs for the RCS messaging engine
//!
//! This crate holds the pure text and XML transformations used by chat and
//! file-transfer sessions: the CPIM envelope with its IMDN headers, IMDN
//! delivery reports, the geolocation push document, file-transfer resume
//! info, resource lists for group conversations and the feature tags a
//! client advertises. Nothing here performs I/O.

pub mod error;
pub mod datetime;
pub mod contact;
pub mod mime;
pub mod multipart;
pub mod cpim;
pub mod imdn;
pub mod geoloc;
pub mod resume_info;
pub mod participants;
pub mod feature_tags;
pub mod message;

mod xml;

pub use error::{CodecError, Result};
pub use contact::ContactId;
pub use cpim::{
    build_cpim_delivery_report, build_cpim_envelope, format_cpim_uri, parse_cpim_envelope,
    CpimMessage, ImdnOptions,
};
pub use imdn::{build_imdn_report, parse_cpim_delivery_report, parse_imdn_report, ImdnReport, ImdnStatus};
pub use geoloc::{build_geoloc_document, parse_geoloc_document, Geoloc};
pub use resume_info::{parse_resume_info, ResumeInfo};
pub use participants::{build_resource_list, parse_resource_list, participants_from_contacts, ParticipantStatus};
pub use feature_tags::{accept_contact_tags, ip_call_feature_tags, supported_feature_tags, CapabilityConfig};
pub use message::{generate_message_id, ChatMessage, MessageKind};
pub use multipart::Multipart;

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        CodecError, Result, ContactId, ChatMessage, MessageKind, CpimMessage, ImdnOptions,
        ImdnReport, ImdnStatus, Geoloc, ResumeInfo, ParticipantStatus, CapabilityConfig,
        Multipart,
    };
}
