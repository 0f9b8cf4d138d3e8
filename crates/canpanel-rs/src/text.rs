//! Display texts.

pub const UNLOCKED: &str = "Unlocked";
pub const LOCKED: &str = "Locked";
pub const WRONG_PASSWORD: &str = "Wrong password";
pub const INTRUSION: &str = "Intrusion!";
pub const REMOTE_INTRUSION: &str = "Intrusion (peer)";
pub const ALARM: &str = "ALARM";
pub const ENTER_OLD_PASSWORD: &str = "Old password?";
pub const ENTER_NEW_PASSWORD: &str = "New password?";
pub const CONFIRM_PASSWORD: &str = "Confirm password";
pub const PASSWORD_CHANGED: &str = "Password changed";
pub const PASSWORDS_DIFFER: &str = "Passwords differ";
pub const CHANGE_REFUSED: &str = "Unlock first";
pub const CHANGE_ABORTED: &str = "Change aborted";
