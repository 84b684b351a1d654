use serde_json::{Value, json};

pub const ASSIGN_ROLES: &str = "assign-roles";
pub const ADMIN: &str = "admin";
pub const ADMIN_VERIFY_USER: &str = "verify-user";
pub const ADMIN_BATCH: &str = "initiate-verification-batch";
pub const ADMIN_RESET_STALE: &str = "reset-stale-verifications";
pub const ADMIN_REBUILD_CATALOG: &str = "rebuild-role-categories";

/// Largest batch an admin may start at once.
pub const MAX_BATCH: i64 = 100;

const OPTION_SUB_COMMAND: u8 = 1;
const OPTION_INTEGER: u8 = 4;
const OPTION_USER: u8 = 6;

/// Slash command definitions, in the bulk-overwrite payload shape.
pub fn definitions() -> Value {
    json!([
        {
            "name": ASSIGN_ROLES,
            "description": "Start or update your skill role verification via DM",
            "type": 1,
            "dm_permission": false,
        },
        {
            "name": ADMIN,
            "description": "Verification administration",
            "type": 1,
            "dm_permission": false,
            "options": [
                {
                    "type": OPTION_SUB_COMMAND,
                    "name": ADMIN_VERIFY_USER,
                    "description": "Start verification for a member",
                    "options": [{
                        "type": OPTION_USER,
                        "name": "member",
                        "description": "The member to start verification for",
                        "required": true,
                    }],
                },
                {
                    "type": OPTION_SUB_COMMAND,
                    "name": ADMIN_BATCH,
                    "description": "Start DM verification for a batch of unverified members",
                    "options": [{
                        "type": OPTION_INTEGER,
                        "name": "count",
                        "description": "Maximum number of members in this batch",
                        "required": true,
                        "min_value": 1,
                        "max_value": MAX_BATCH,
                    }],
                },
                {
                    "type": OPTION_SUB_COMMAND,
                    "name": ADMIN_RESET_STALE,
                    "description": "Move members stuck in progress or without status back to unverified",
                },
                {
                    "type": OPTION_SUB_COMMAND,
                    "name": ADMIN_REBUILD_CATALOG,
                    "description": "Re-classify guild roles into skill categories",
                },
            ],
        },
    ])
}
