//! User and group entities.

use super::ids::{GroupId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub userid: UserId,
    /// The client DN, used as the lookup key.
    pub username: String,
    pub banned: bool,
    pub xattrs: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub groupid: GroupId,
    pub groupname: String,
    pub banned: bool,
    pub xattrs: String,
}
