mod header;
mod macros;
mod media_type;
mod sniff;

pub use self::header::{HeaderError, HeaderMap};
pub use self::media_type::{format_media_type, parse_media_type, MediaType, MediaTypeError};
pub use self::sniff::{detect_content_type, SNIFF_LEN};
