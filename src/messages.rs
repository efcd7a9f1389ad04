//! Response message catalogue. Templates use `{name}` placeholders filled by
//! [`interpolate_message`].

pub const SIGNUP_OK: &str = "Account created for {email}";
pub const LOGIN_OK: &str = "Logged in as {email}";
pub const LOGOUT_OK: &str = "Logged out";
pub const EMAIL_TAKEN: &str = "Email {email} is already registered";
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub const PROFILE_OK: &str = "Profile retrieved";
pub const ROLE_UPDATED: &str = "Role of user {id} set to {role}";
pub const SKILLS_OK: &str = "Skills of user {id} retrieved";
pub const SKILLS_UPDATED: &str = "Skills of user {id} updated";
pub const USERS_OK: &str = "Users retrieved";
pub const MODERATORS_OK: &str = "Moderators retrieved";
pub const USER_NOT_FOUND: &str = "User {id} not found";

pub const TICKET_CREATED: &str = "Ticket {id} created";
pub const TICKET_OK: &str = "Ticket {id} retrieved";
pub const TICKETS_OK: &str = "Tickets retrieved";
pub const TICKET_UPDATED: &str = "Ticket {id} updated";
pub const TICKET_DELETED: &str = "Ticket {id} deleted";
pub const TICKET_NOT_FOUND: &str = "Ticket {id} not found";

pub const EVENT_ACCEPTED: &str = "Event {name} accepted";

/// Replaces every `{key}` in `template` whose key is present in `args`.
/// Placeholders without a value are left untouched.
pub fn interpolate_message(template: &str, args: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match args.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
