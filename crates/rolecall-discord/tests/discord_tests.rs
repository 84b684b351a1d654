#[cfg(test)]
mod tests {
    use rolecall_core::*;
    use rolecall_discord::api::colors;
    use rolecall_discord::commands;
    use rolecall_discord::events::parse_dispatch;
    use rolecall_discord::gateway::INTENTS;
    use rolecall_discord::*;
    use serde_json::json;

    // ── Dispatch parsing ───────────────────────────────────────

    #[test]
    fn test_parse_ready() {
        let data = json!({
            "user": { "id": "42", "username": "rolecall" },
            "application": { "id": "77" },
            "guilds": [{ "id": "1", "unavailable": true }, { "id": "2" }]
        });
        match parse_dispatch("READY", &data, None) {
            Some(GatewayEvent::Ready {
                bot_user_id,
                application_id,
                guild_ids,
            }) => {
                assert_eq!(bot_user_id, UserId(42));
                assert_eq!(application_id, Some(ApplicationId(77)));
                assert_eq!(guild_ids, vec![GuildId(1), GuildId(2)]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_guild_create_roles() {
        let data = json!({
            "id": "10",
            "name": "Dev Hub",
            "roles": [
                { "id": "10", "name": "@everyone", "position": 0 },
                { "id": "123", "name": "Python Developer", "position": 3 },
                { "id": "555", "name": "Bot Role", "position": 9, "managed": true }
            ]
        });
        match parse_dispatch("GUILD_CREATE", &data, None) {
            Some(GatewayEvent::GuildAvailable {
                guild_id,
                name,
                roles,
            }) => {
                assert_eq!(guild_id, GuildId(10));
                assert_eq!(name, "Dev Hub");
                assert_eq!(roles.len(), 3);
                assert_eq!(roles[1].name, "Python Developer");
                assert_eq!(roles[1].position, 3);
                assert!(roles[2].managed);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_role_events() {
        for name in ["GUILD_ROLE_CREATE", "GUILD_ROLE_UPDATE", "GUILD_ROLE_DELETE"] {
            let event = parse_dispatch(name, &json!({ "guild_id": "10" }), None);
            assert!(matches!(
                event,
                Some(GatewayEvent::RolesChanged { guild_id: GuildId(10) })
            ));
        }
    }

    #[test]
    fn test_parse_member_join() {
        let data = json!({
            "guild_id": "10",
            "user": { "id": "5", "username": "alice", "global_name": "Alice" },
            "roles": []
        });
        match parse_dispatch("GUILD_MEMBER_ADD", &data, None) {
            Some(GatewayEvent::MemberJoined { guild_id, member }) => {
                assert_eq!(guild_id, GuildId(10));
                assert_eq!(member.user_id, UserId(5));
                assert_eq!(member.name(), "Alice");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_direct_message_accepted() {
        let data = json!({
            "channel_id": "900",
            "author": { "id": "5", "username": "alice" },
            "content": "  I write Rust  "
        });
        match parse_dispatch("MESSAGE_CREATE", &data, Some(UserId(42))) {
            Some(GatewayEvent::DirectMessage {
                channel_id,
                author,
                content,
            }) => {
                assert_eq!(channel_id, ChannelId(900));
                assert_eq!(author, UserId(5));
                assert_eq!(content, "I write Rust");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_guild_and_bot_messages_ignored() {
        let guild_msg = json!({
            "guild_id": "10",
            "channel_id": "1",
            "author": { "id": "5" },
            "content": "hi"
        });
        assert!(parse_dispatch("MESSAGE_CREATE", &guild_msg, None).is_none());

        let bot_msg = json!({
            "channel_id": "1",
            "author": { "id": "6", "bot": true },
            "content": "hi"
        });
        assert!(parse_dispatch("MESSAGE_CREATE", &bot_msg, None).is_none());

        let own_msg = json!({
            "channel_id": "1",
            "author": { "id": "42" },
            "content": "hi"
        });
        assert!(parse_dispatch("MESSAGE_CREATE", &own_msg, Some(UserId(42))).is_none());

        let empty = json!({
            "channel_id": "1",
            "author": { "id": "5" },
            "content": "   "
        });
        assert!(parse_dispatch("MESSAGE_CREATE", &empty, None).is_none());
    }

    #[test]
    fn test_parse_admin_subcommand() {
        let data = json!({
            "type": 2,
            "id": "i-1",
            "token": "tok",
            "application_id": "77",
            "guild_id": "10",
            "channel_id": "3",
            "member": {
                "user": { "id": "8", "username": "mod" },
                "roles": ["900"]
            },
            "data": {
                "name": "admin",
                "options": [{
                    "type": 1,
                    "name": "initiate-verification-batch",
                    "options": [{ "type": 4, "name": "count", "value": 25 }]
                }]
            }
        });
        let Some(GatewayEvent::Command(cmd)) = parse_dispatch("INTERACTION_CREATE", &data, None)
        else {
            panic!("expected a command");
        };
        assert_eq!(cmd.name, "admin");
        assert_eq!(cmd.subcommand.as_deref(), Some(commands::ADMIN_BATCH));
        assert_eq!(cmd.path(), "admin initiate-verification-batch");
        assert_eq!(cmd.option_int("count"), Some(25));
        assert_eq!(cmd.guild_id, Some(GuildId(10)));
        assert_eq!(cmd.interaction.application_id, ApplicationId(77));
        let member = cmd.member.expect("member");
        assert!(member.has_role(RoleId(900)));
    }

    #[test]
    fn test_parse_user_option() {
        let data = json!({
            "type": 2,
            "id": "i-2",
            "token": "tok",
            "application_id": "77",
            "data": {
                "name": "admin",
                "options": [{
                    "type": 1,
                    "name": "verify-user",
                    "options": [{ "type": 6, "name": "member", "value": "12345" }]
                }]
            }
        });
        let Some(GatewayEvent::Command(cmd)) = parse_dispatch("INTERACTION_CREATE", &data, None)
        else {
            panic!("expected a command");
        };
        assert_eq!(cmd.option_user("member"), Some(UserId(12345)));
        assert!(cmd.member.is_none());
    }

    #[test]
    fn test_non_command_interactions_ignored() {
        let autocomplete = json!({
            "type": 4,
            "id": "i-3",
            "token": "tok",
            "application_id": "77",
            "data": { "name": "admin" }
        });
        assert!(parse_dispatch("INTERACTION_CREATE", &autocomplete, None).is_none());
        assert!(parse_dispatch("TYPING_START", &json!({}), None).is_none());
    }

    // ── Commands & embeds ──────────────────────────────────────

    #[test]
    fn test_command_definitions() {
        let defs = commands::definitions();
        let arr = defs.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["name"], "assign-roles");

        let subs: Vec<&str> = arr[1]["options"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            subs,
            vec![
                commands::ADMIN_VERIFY_USER,
                commands::ADMIN_BATCH,
                commands::ADMIN_RESET_STALE,
                commands::ADMIN_REBUILD_CATALOG,
            ]
        );
        assert_eq!(arr[1]["options"][1]["options"][0]["max_value"], 100);
    }

    #[test]
    fn test_embed_serialization() {
        let embed = Embed::new("✅ New User Verified: alice", "Welcome", colors::GREEN)
            .field("Roles", "Python Developer", false)
            .footer("rolecall");
        let v = serde_json::to_value(&embed).unwrap();
        assert_eq!(v["title"], "✅ New User Verified: alice");
        assert_eq!(v["color"], colors::GREEN);
        assert_eq!(v["fields"][0]["name"], "Roles");
        assert_eq!(v["fields"][0]["inline"], false);
        assert_eq!(v["footer"]["text"], "rolecall");
        assert!(v["timestamp"].is_string());

        let bare = serde_json::to_value(Embed::default()).unwrap();
        assert_eq!(bare, json!({}));
    }

    #[test]
    fn test_intents_cover_members_and_dm_content() {
        assert_eq!(INTENTS, 37379);
    }

    // ── MockGuild ──────────────────────────────────────────────

    fn alice() -> Member {
        Member {
            user_id: UserId(5),
            username: "alice".into(),
            display_name: None,
            bot: false,
            roles: vec![RoleId(1)],
        }
    }

    #[tokio::test]
    async fn test_mock_role_mutations() {
        let guild = MockGuild::new().with_member(alice());
        guild
            .add_member_role(GuildId(10), UserId(5), RoleId(2), "verified")
            .await
            .unwrap();
        guild
            .remove_member_role(GuildId(10), UserId(5), RoleId(1), "verified")
            .await
            .unwrap();

        assert_eq!(guild.member_roles(UserId(5)), vec![RoleId(2)]);
        let ops = guild.role_ops_for(UserId(5));
        assert_eq!(ops.len(), 2);
        assert!(ops[0].added);
        assert!(!ops[1].added);
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let guild = MockGuild::new()
            .with_member(alice())
            .with_failing_role(RoleId(3))
            .with_flaky_role(RoleId(4), 1);

        let err = guild
            .add_member_role(GuildId(10), UserId(5), RoleId(3), "x")
            .await
            .unwrap_err();
        assert!(!err.is_transient());

        let err = guild
            .add_member_role(GuildId(10), UserId(5), RoleId(4), "x")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        guild
            .add_member_role(GuildId(10), UserId(5), RoleId(4), "x")
            .await
            .unwrap();
        assert!(guild.member_roles(UserId(5)).contains(&RoleId(4)));
    }

    #[tokio::test]
    async fn test_mock_dms() {
        let guild = MockGuild::new().with_dm_blocked(UserId(6));
        let channel = guild.open_dm(UserId(5)).await.unwrap();
        assert_eq!(guild.open_dm(UserId(5)).await.unwrap(), channel);
        guild.send_message(channel, "hello").await.unwrap();
        assert_eq!(guild.dms_to(UserId(5)), vec!["hello".to_string()]);

        assert!(guild.open_dm(UserId(6)).await.is_err());
        assert!(guild.dms_to(UserId(6)).is_empty());
    }
}
