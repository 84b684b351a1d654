use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a verification session.
pub type SessionId = Uuid;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map($name)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                $name(v)
            }
        }

        // Discord sends snowflakes as strings; config files and oracle
        // replies may use bare integers.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(&self.0.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                SnowflakeRepr::deserialize(d)?
                    .into_u64()
                    .map($name)
                    .map_err(serde::de::Error::custom)
            }
        }
    };
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnowflakeRepr {
    Int(u64),
    Str(String),
}

impl SnowflakeRepr {
    fn into_u64(self) -> Result<u64, String> {
        match self {
            SnowflakeRepr::Int(v) => Ok(v),
            SnowflakeRepr::Str(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid snowflake '{s}': {e}")),
        }
    }
}

snowflake!(
    /// A Discord role identifier.
    RoleId
);
snowflake!(
    /// A Discord user identifier.
    UserId
);
snowflake!(
    /// A Discord channel identifier (guild text channel or DM).
    ChannelId
);
snowflake!(
    /// A Discord guild identifier.
    GuildId
);
snowflake!(
    /// A Discord application identifier (owner of slash commands).
    ApplicationId
);

/// A guild role as seen by the bot. Immutable from the bot's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// Position in the guild hierarchy (higher outranks lower).
    #[serde(default)]
    pub position: i64,
    /// Roles owned by an integration cannot be assigned manually.
    #[serde(default)]
    pub managed: bool,
}

impl Role {
    pub fn new(id: impl Into<RoleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position: 0,
            managed: false,
        }
    }
}

/// The three fixed role groupings.
///
/// Serialized with the human display spelling (`"Programming Language"`);
/// the underscore spelling used in oracle dialogue replies
/// (`"Programming_Language"`) is accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    ProgrammingLanguage,
    ExperienceLevel,
    OperatingSystem,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::ProgrammingLanguage,
        Category::ExperienceLevel,
        Category::OperatingSystem,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Category::ProgrammingLanguage => "Programming Language",
            Category::ExperienceLevel => "Experience Level",
            Category::OperatingSystem => "Operating System",
        }
    }

    /// Key used in the structured dialogue reply.
    pub fn dialogue_key(self) -> &'static str {
        match self {
            Category::ProgrammingLanguage => "Programming_Language",
            Category::ExperienceLevel => "Experience_Level",
            Category::OperatingSystem => "Operating_System",
        }
    }

    /// Resolve either spelling, ignoring case.
    pub fn from_key(key: &str) -> Option<Self> {
        let normalized = key.trim().replace('_', " ").to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.display_name().to_lowercase() == normalized)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.display_name())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Category::from_key(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown category '{raw}'")))
    }
}

/// A guild member as far as verification is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

impl Member {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }

    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}
