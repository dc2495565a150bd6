//! Hash-password command.

use anyhow::Result;
use marvelous_auth_gateway::auth::{hash_password, verify_password};

use crate::ui;

/// Hash-password command arguments.
#[derive(Debug, Clone, Default)]
pub struct HashArgs {
    /// Password; prompted for when absent.
    pub password: Option<String>,
    /// Check the password against this hash instead of hashing it.
    pub verify: Option<String>,
}

/// Only a new password is typed twice; verification checks an existing one.
const fn confirms_password(args: &HashArgs) -> bool {
    args.verify.is_none()
}

/// Hash a password, or verify it against a stored hash.
pub fn run_hash_password(args: HashArgs) -> Result<()> {
    let confirm = confirms_password(&args);
    let password = match args.password {
        Some(password) => password,
        None if confirm => ui::prompts::new_password("Password")?,
        None => ui::prompts::password("Password")?,
    };
    if password.is_empty() {
        anyhow::bail!("Password is empty");
    }

    match args.verify {
        Some(hash) => {
            if verify_password(&password, &hash)? {
                ui::success("Password matches");
            } else {
                ui::error("Password does not match");
            }
        }
        None => println!("{}", hash_password(&password)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirms_only_when_hashing() {
        assert!(confirms_password(&HashArgs::default()));
        assert!(!confirms_password(&HashArgs {
            verify: Some(hash_password("secret")),
            ..HashArgs::default()
        }));
    }

    #[test]
    fn test_verify_given_password() {
        let args = HashArgs {
            password: Some("secret".to_string()),
            verify: Some(hash_password("secret")),
        };
        assert!(run_hash_password(args).is_ok());
    }

    #[test]
    fn test_empty_password_rejected() {
        let args = HashArgs {
            password: Some(String::new()),
            verify: None,
        };
        assert!(run_hash_password(args).is_err());
    }
}
