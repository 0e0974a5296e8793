//! Numeric replies the client engine reacts to.
//!
//! Kept as string constants because numerics arrive as the verb of a parsed
//! [`crate::Message`].

/// Registration complete.
pub const RPL_WELCOME: &str = "001";
/// Server feature advertisement.
pub const RPL_ISUPPORT: &str = "005";

/// Nickname contains invalid characters.
pub const ERR_ERRONEUSNICKNAME: &str = "432";
/// Nickname already taken.
pub const ERR_NICKNAMEINUSE: &str = "433";
/// Nickname collision (server-to-server).
pub const ERR_NICKCOLLISION: &str = "436";

/// Logged in to an account.
pub const RPL_LOGGEDIN: &str = "900";
/// Logged out of an account.
pub const RPL_LOGGEDOUT: &str = "901";
/// Account locked or held by another nickname.
pub const ERR_NICKLOCKED: &str = "902";
/// SASL exchange succeeded.
pub const RPL_SASLSUCCESS: &str = "903";
/// SASL exchange failed.
pub const ERR_SASLFAIL: &str = "904";
/// SASL payload exceeded the server's limit.
pub const ERR_SASLTOOLONG: &str = "905";
/// SASL exchange aborted.
pub const ERR_SASLABORTED: &str = "906";
/// Already authenticated.
pub const ERR_SASLALREADY: &str = "907";
/// Mechanisms the server supports.
pub const RPL_SASLMECHS: &str = "908";

/// Every SASL terminal or informational numeric.
pub const SASL_NUMERICS: [&str; 9] = [
    RPL_LOGGEDIN,
    RPL_LOGGEDOUT,
    ERR_NICKLOCKED,
    RPL_SASLSUCCESS,
    ERR_SASLFAIL,
    ERR_SASLTOOLONG,
    ERR_SASLABORTED,
    ERR_SASLALREADY,
    RPL_SASLMECHS,
];
