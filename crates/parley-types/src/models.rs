use serde::{Deserialize, Serialize};

/// Closed set of avatar variants. The avatar URL is a pure function of the
/// variant and the username, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Usernames are restricted to `[A-Za-z0-9_.-]`, which is URL-safe, so
    /// no percent-escaping is needed here.
    pub fn avatar_url(self, username: &str) -> String {
        match self {
            Gender::Male => {
                format!("https://avatar.iran.liara.run/public/boy?username={username}")
            }
            Gender::Female => {
                format!("https://avatar.iran.liara.run/public/girl?username={username}")
            }
        }
    }
}
