//! yEnc content encoding for Usenet binaries
//!
//! yEnc is a binary-to-text encoding scheme designed specifically for Usenet.
//! It has only 1-2% overhead compared to 33-40% for Base64.
//!
//! Only the body transform lives here; the `=ybegin`/`=ypart`/`=yend`
//! framing is rendered by the article builder.
//!
//! Reference: http://www.yenc.org/yenc-draft.1.3.txt

pub mod encode;

pub use encode::{ContentEncoder, DEFAULT_LINE_LENGTH, YencEncoder};
