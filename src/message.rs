use serde::{Deserialize, Serialize};

/// An opaque principal with a display name. Value semantics — two
/// `User`s are equal iff their names are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "Name")]
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Wire shape for both directions: `{ "user": { "Name": "..." }, "content": "..." }`.
///
/// `sender` is `#[serde(default)]` so a client payload that omits the
/// field (it carries no authority over its own sender) still decodes —
/// the server always overwrites it before the message reaches the
/// broadcast inbox (invariant I4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "user", default)]
    pub sender: User,
    pub content: String,
}

impl Message {
    pub fn stamp_sender(&mut self, sender: User) {
        self.sender = sender;
    }
}
