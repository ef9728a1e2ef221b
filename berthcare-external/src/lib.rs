//! # BerthCare External
//!
//! Gateways to the services the core mediates:
//!
//! - **`storage`**: pre-signed S3 upload/download URLs under per-artifact
//!   size/type/TTL policies. Issuing a URL creates no state; metadata rows
//!   exist only after the client confirms the upload.
//! - **`geocode`**: forward geocoding, the service-area check and
//!   nearest-zone assignment.
//! - **`twilio`**: outbound voice/SMS plus `X-Twilio-Signature`
//!   verification for inbound webhooks.
//!
//! Every network call here carries its own timeout; callers treat these
//! gateways as failure-prone and degrade accordingly.

pub mod geocode;
pub mod storage;
pub mod twilio;

pub use geocode::{GeoPoint, Geocoder, HttpGeocoder};
pub use storage::{ObjectStorage, PresignedUpload, UploadKind};
pub use twilio::TwilioClient;
