//! WHOIS response records: what was asked, of whom and when, what came back, and what the
//! payload turned out to be. A record serializes to a MIME-style framing that can be stored
//! and read back.

pub mod charset;
pub mod mime;
mod response;

pub use self::response::{ReadMimeError, Response};
