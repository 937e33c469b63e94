use std::str::FromStr;

use serde::Deserialize;

use super::Team;

/// A user or group of users holding some kind of permission.
///
/// On the wire an entity is a single string such as `user-liz@example.com`, `group-admins`,
/// `domain-example.com`, `project-owners-1234` or the special values `allUsers` and
/// `allAuthenticatedUsers`.
#[derive(Debug, PartialEq, Clone)]
pub enum Entity {
    /// A single user, identified by its id.
    UserId(String),
    /// A single user, identified by its email address.
    UserEmail(String),
    /// A group of users, identified by its id.
    GroupId(String),
    /// A group of users, identified by its email address.
    GroupEmail(String),
    /// All users whose email ends with the domain.
    Domain(String),
    /// All users within a project, identified by the `team` name and `project` id.
    Project(Team, String),
    /// All users.
    AllUsers,
    /// All users that are logged in.
    AllAuthenticatedUsers,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Entity::UserId(s) | Entity::UserEmail(s) => write!(f, "user-{}", s),
            Entity::GroupId(s) | Entity::GroupEmail(s) => write!(f, "group-{}", s),
            Entity::Domain(s) => write!(f, "domain-{}", s),
            Entity::Project(team, project_id) => write!(f, "project-{}-{}", team, project_id),
            Entity::AllUsers => write!(f, "allUsers"),
            Entity::AllAuthenticatedUsers => write!(f, "allAuthenticatedUsers"),
        }
    }
}

impl FromStr for Entity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split('-').collect();
        let is_email = |rest: &[&str]| rest.iter().any(|s| s.contains('@'));
        let entity = match &parts[..] {
            ["user", rest @ ..] if is_email(rest) => Entity::UserEmail(rest.join("-")),
            ["user", rest @ ..] => Entity::UserId(rest.join("-")),
            ["group", rest @ ..] if is_email(rest) => Entity::GroupEmail(rest.join("-")),
            ["group", rest @ ..] => Entity::GroupId(rest.join("-")),
            ["domain", rest @ ..] => Entity::Domain(rest.join("-")),
            ["project", team, project_id] => {
                Entity::Project(Team::from_str(team)?, project_id.to_string())
            }
            ["allUsers"] => Entity::AllUsers,
            ["allAuthenticatedUsers"] => Entity::AllAuthenticatedUsers,
            _ => return Err(format!("Unexpected `Entity`: {}", value)),
        };
        Ok(entity)
    }
}

// Entities serialize as their wire string, not as an object.
impl serde::Serialize for Entity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Entity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Entity::from_str(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let cases = [
            (Entity::UserId("some id".to_string()), "\"user-some id\""),
            (Entity::UserEmail("some@email".to_string()), "\"user-some@email\""),
            (Entity::GroupId("group-id".to_string()), "\"group-group-id\""),
            (Entity::GroupEmail("some@group.email".to_string()), "\"group-some@group.email\""),
            (Entity::Domain("example.com".to_string()), "\"domain-example.com\""),
            (Entity::Project(Team::Viewers, "project id".to_string()), "\"project-viewers-project id\""),
            (Entity::AllUsers, "\"allUsers\""),
            (Entity::AllAuthenticatedUsers, "\"allAuthenticatedUsers\""),
        ];
        for (entity, wire) in cases {
            assert_eq!(serde_json::to_string(&entity).unwrap(), wire);
            assert_eq!(serde_json::from_str::<Entity>(wire).unwrap(), entity);
        }
    }

    #[test]
    fn rejects_unknown_entities() {
        assert!(serde_json::from_str::<Entity>("\"everyone\"").is_err());
    }
}
