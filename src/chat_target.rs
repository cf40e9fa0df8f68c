//! Chat target normalization
//!
//! Every send path (direct text, file, relay action) resolves its receiver
//! through [`normalize`] so the same raw input always reaches the same chat.

pub const INDIVIDUAL_SUFFIX: &str = "@c.us";
pub const GROUP_SUFFIX: &str = "@g.us";

/// Normalize a raw receiver into a network chat id.
///
/// Individual targets keep only their digits and gain `@c.us`; group
/// targets gain `@g.us` when missing.
pub fn normalize(receiver: &str, is_group: bool) -> String {
    if is_group {
        if receiver.ends_with(GROUP_SUFFIX) {
            receiver.to_string()
        } else {
            format!("{receiver}{GROUP_SUFFIX}")
        }
    } else {
        let digits: String = receiver.chars().filter(char::is_ascii_digit).collect();
        format!("{digits}{INDIVIDUAL_SUFFIX}")
    }
}

/// Whether a raw target already names a group chat
pub fn looks_like_group(receiver: &str) -> bool {
    receiver.ends_with(GROUP_SUFFIX)
}
