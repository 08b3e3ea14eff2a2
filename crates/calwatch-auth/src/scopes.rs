const SCOPE_BASE: &str = "https://www.googleapis.com/auth/";

/// OAuth scopes the service requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Read/write calendar events and create event watch channels.
    Calendar,
    /// Read the user directory and watch it for new accounts.
    UserDirectory,
}

impl Scope {
    pub fn url(&self) -> String {
        let suffix = match self {
            Scope::Calendar => "calendar",
            Scope::UserDirectory => "admin.directory.user",
        };
        format!("{}{}", SCOPE_BASE, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_urls() {
        assert_eq!(Scope::Calendar.url(), "https://www.googleapis.com/auth/calendar");
        assert_eq!(
            Scope::UserDirectory.url(),
            "https://www.googleapis.com/auth/admin.directory.user"
        );
    }
}
