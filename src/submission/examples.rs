//! Corrective examples returned with 400 responses.

use serde_json::{json, Value};

use super::Action;

/// Example of a well-formed request body, sent back for malformed JSON.
pub fn request_format_example() -> Value {
    json!({
        "error": "Request must be valid JSON",
        "format": "Content-Type: application/json",
        "example": {
            "action": "auth",
            "auth": {
                "email": "user@example.com",
                "password": "your-password"
            }
        }
    })
}

/// One valid body per action, sent back for validation failures.
pub fn action_examples() -> Value {
    let valid: Vec<&str> = Action::ALL.iter().map(Action::as_str).collect();
    json!({
        "valid_actions": valid,
        "examples": {
            "auth": {
                "action": "auth",
                "auth": {
                    "email": "user@example.com",
                    "password": "your-password"
                }
            },
            "log": {
                "action": "log",
                "log": {
                    "name": "user-action",
                    "data": "User logged in successfully"
                }
            },
            "logdirect": {
                "action": "logdirect",
                "log": {
                    "name": "system-event",
                    "data": "Direct log to service"
                }
            },
            "mail": {
                "action": "mail",
                "mail": {
                    "from": "noreply@example.com",
                    "to": "user@example.com",
                    "subject": "Welcome!",
                    "message": "Welcome to our service"
                }
            }
        }
    })
}
