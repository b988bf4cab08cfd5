use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Discriminator behind the `Student` / `Instructor` views over `users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Student,
    Instructor,
}

impl FromStr for UserType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "instructor" => Ok(Self::Instructor),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Instructor => write!(f, "instructor"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub user_type: UserType,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login: Option<String>,
    pub date_joined: String,
}

impl User {
    /// Instructors (and superusers) may manage courses.
    pub fn can_teach(&self) -> bool {
        self.user_type == UserType::Instructor || self.is_superuser
    }

    pub fn can_administer(&self) -> bool {
        self.is_staff || self.is_superuser
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

/// Self-service registration input (signup form and API).
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub password1: String,
    pub password2: String,
    #[serde(default, rename = "type")]
    pub user_type: UserType,
}
