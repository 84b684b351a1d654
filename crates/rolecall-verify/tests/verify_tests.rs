#[cfg(test)]
mod tests {
    use rolecall_config::RolecallConfig;
    use rolecall_core::{Category, ChannelId, GuildId, Member, Role, RoleId, UserId};
    use rolecall_discord::MockGuild;
    use rolecall_llm::mock::MockProvider;
    use rolecall_llm::{OracleClient, RetryPolicy};
    use rolecall_verify::catalog::{CategorizedRoles, RoleCatalog};
    use rolecall_verify::dialogue::{ConversationState, DialogueController, DialogueState, TurnKind};
    use rolecall_verify::reply::PROPOSE_USER_ROLES;
    use rolecall_verify::service::{ServiceSettings, StartOrigin, StartOutcome, TIMEOUT_MESSAGE};
    use rolecall_verify::{CatalogStore, DmDelivery, Prompts, SessionReport, VerificationService};
    use std::sync::Arc;
    use std::time::Duration;

    const GUILD: GuildId = GuildId(1);
    const PYTHON: RoleId = RoleId(101);
    const WINDOWS: RoleId = RoleId(102);
    const BEGINNER: RoleId = RoleId(103);
    const LINUX: RoleId = RoleId(104);
    const GAMING: RoleId = RoleId(105);
    const VERIFIED: RoleId = RoleId(10);
    const UNVERIFIED: RoleId = RoleId(11);
    const IN_PROGRESS: RoleId = RoleId(12);
    const ADMIN_CHANNEL: ChannelId = ChannelId(500);
    const ALICE: UserId = UserId(42);

    fn guild_roles() -> Vec<Role> {
        vec![
            Role::new(1u64, "@everyone"),
            Role::new(PYTHON, "Python"),
            Role::new(WINDOWS, "Windows"),
            Role::new(BEGINNER, "Beginner"),
            Role::new(LINUX, "Linux"),
            Role::new(GAMING, "Gaming"),
            Role::new(VERIFIED, "Verified"),
            Role::new(UNVERIFIED, "Unverified"),
            Role::new(IN_PROGRESS, "Verifying"),
        ]
    }

    fn categorized() -> CategorizedRoles {
        CategorizedRoles::new()
            .with(Category::ProgrammingLanguage, &["Python"])
            .with(Category::ExperienceLevel, &["Beginner"])
            .with(Category::OperatingSystem, &["Windows", "Linux"])
    }

    fn catalog() -> RoleCatalog {
        RoleCatalog::resolve(&categorized(), &guild_roles())
    }

    fn member(user: UserId, roles: &[RoleId]) -> Member {
        Member {
            user_id: user,
            username: format!("user{user}"),
            display_name: None,
            bot: false,
            roles: roles.to_vec(),
        }
    }

    fn oracle(mock: &Arc<MockProvider>) -> OracleClient {
        OracleClient::new(mock.clone(), "test-model", 512).with_retry(RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
        })
    }

    fn controller(mock: &Arc<MockProvider>) -> DialogueController {
        DialogueController::new(oracle(mock), Arc::new(Prompts::default()), 12)
    }

    /// A propose_user_roles payload.
    fn reply(classification: &str, message: &str, complete: bool, confirmed: bool) -> String {
        format!(
            r#"{{"classification":{classification},"message_to_user":"{message}","is_complete":{complete},"user_has_confirmed":{confirmed}}}"#
        )
    }

    fn python_windows_beginner() -> String {
        format!(
            r#"{{"Programming_Language":[{}],"Experience_Level":[{}],"Operating_System":[{}]}}"#,
            PYTHON, BEGINNER, WINDOWS
        )
    }

    // ── Dialogue state machine ─────────────────────────────────

    #[tokio::test]
    async fn test_confirmation_requires_pending_proposal() {
        let mock = Arc::new(
            MockProvider::new("mock")
                // Oracle jumps straight to "confirmed" on the first turn.
                .with_tool_call(
                    PROPOSE_USER_ROLES,
                    &reply(&python_windows_beginner(), "You get Python, Windows, Beginner. OK?", true, true),
                )
                .with_tool_call(
                    PROPOSE_USER_ROLES,
                    &reply("null", "Great, assigning now.", true, true),
                ),
        );
        let ctl = controller(&mock);
        let cat = catalog();
        let mut session = ConversationState::new(ALICE, 3);

        let first = ctl.take_turn(&mut session, &cat, "python on windows, newbie", &[]).await.unwrap();
        assert_eq!(first.state, DialogueState::ProposalPending);
        assert!(!session.user_has_confirmed);

        let second = ctl.take_turn(&mut session, &cat, "yes", &[]).await.unwrap();
        assert_eq!(second.state, DialogueState::Confirmed);
        assert!(session.is_complete && session.user_has_confirmed);
        // null classification keeps what was confirmed
        assert_eq!(
            session.final_role_ids().into_iter().collect::<Vec<_>>(),
            vec![PYTHON, WINDOWS, BEGINNER]
        );
    }

    #[tokio::test]
    async fn test_final_turn_is_always_complete_and_confirmed() {
        let mock = Arc::new(MockProvider::new("mock").with_tool_call(
            PROPOSE_USER_ROLES,
            &reply(&python_windows_beginner(), "Which of these fits?", false, false),
        ));
        let ctl = controller(&mock);
        let mut session = ConversationState::new(ALICE, 1);
        assert!(session.is_final_attempt());

        let out = ctl.take_turn(&mut session, &catalog(), "python, windows", &[]).await.unwrap();
        assert_eq!(out.state, DialogueState::FinalForced);
        assert!(session.is_complete);
        assert!(session.user_has_confirmed);

        let sent = mock.recorded_requests().lock()[0].clone();
        let last = sent.messages.last().unwrap();
        assert!(last.content.contains("final attempt"));
        assert!(last.content.ends_with("python, windows"));
    }

    #[tokio::test]
    async fn test_final_turn_without_roles_abandons_with_hint() {
        let mock = Arc::new(MockProvider::new("mock").with_tool_call(
            PROPOSE_USER_ROLES,
            &reply("null", "Sorry, I couldn't work out any roles.", true, true),
        ));
        let ctl = controller(&mock);
        let mut session = ConversationState::new(ALICE, 1);

        let out = ctl.take_turn(&mut session, &catalog(), "dunno", &[]).await.unwrap();
        assert_eq!(out.state, DialogueState::Abandoned);
        assert!(out.message.contains("/assign-roles"));
        assert!(session.final_role_ids().is_empty());
        assert!(session.is_complete && session.user_has_confirmed);
    }

    #[tokio::test]
    async fn test_trailing_comma_retries_once_then_noop() {
        let bad = r#"{"classification":{"Programming_Language":[101,]},"message_to_user":"x","is_complete":false,"user_has_confirmed":false}"#;
        let mock = Arc::new(
            MockProvider::new("mock")
                .with_tool_call(PROPOSE_USER_ROLES, bad)
                .with_tool_call(PROPOSE_USER_ROLES, bad),
        );
        let ctl = controller(&mock);
        let mut session = ConversationState::new(ALICE, 3);

        let out = ctl.take_turn(&mut session, &catalog(), "python", &[]).await.unwrap();
        assert_eq!(out.kind, TurnKind::NoOp);
        assert_eq!(out.state, DialogueState::Gathering);
        assert_eq!(mock.request_count(), 2);
        assert_eq!(session.turns_taken, 1);
        assert!(session.proposed_classification.is_none());

        let retry = mock.recorded_requests().lock()[1].clone();
        assert!(retry.messages.last().unwrap().content.contains("could not be parsed"));
    }

    #[tokio::test]
    async fn test_format_reminder_recovers_the_turn() {
        let mock = Arc::new(
            MockProvider::new("mock")
                .with_response("Sure! You sound like a Python dev.")
                .with_tool_call(
                    PROPOSE_USER_ROLES,
                    &reply("null", "Which OS do you use?", false, false),
                ),
        );
        let ctl = controller(&mock);
        let mut session = ConversationState::new(ALICE, 3);

        let out = ctl.take_turn(&mut session, &catalog(), "python", &[]).await.unwrap();
        assert_eq!(out.kind, TurnKind::Reply);
        assert_eq!(out.message, "Which OS do you use?");
        assert_eq!(session.turns_taken, 1);
    }

    #[tokio::test]
    async fn test_unavailable_oracle_does_not_consume_a_turn() {
        let mock = Arc::new(MockProvider::new("mock").with_error("connection refused"));
        let ctl = controller(&mock);
        let mut session = ConversationState::new(ALICE, 3);

        let out = ctl.take_turn(&mut session, &catalog(), "python", &[]).await.unwrap();
        assert_eq!(out.kind, TurnKind::OracleUnavailable);
        assert_eq!(session.turns_taken, 0);
        assert!(session.transcript.is_empty());
        assert_eq!(session.state, DialogueState::Gathering);
    }

    #[tokio::test]
    async fn test_roles_outside_catalog_are_dropped() {
        let classification = format!(
            r#"{{"Programming_Language":[{}, 999],"Experience_Level":[{}],"Operating_System":[]}}"#,
            PYTHON, GAMING
        );
        let mock = Arc::new(MockProvider::new("mock").with_tool_call(
            PROPOSE_USER_ROLES,
            &reply(&classification, "Python it is?", true, false),
        ));
        let ctl = controller(&mock);
        let mut session = ConversationState::new(ALICE, 3);

        let out = ctl.take_turn(&mut session, &catalog(), "python and games", &[]).await.unwrap();
        assert_eq!(out.rejected_roles.len(), 2);
        assert_eq!(session.final_role_ids().into_iter().collect::<Vec<_>>(), vec![PYTHON]);
    }

    #[tokio::test]
    async fn test_update_note_sent_once_with_current_roles() {
        let mock = Arc::new(
            MockProvider::new("mock")
                .with_tool_call(PROPOSE_USER_ROLES, &reply("null", "What changed?", false, false))
                .with_tool_call(PROPOSE_USER_ROLES, &reply("null", "Anything else?", false, false)),
        );
        let ctl = controller(&mock);
        let cat = catalog();
        let mut session =
            ConversationState::new(ALICE, 3).with_prior_roles([PYTHON].into_iter().collect());
        let current = vec!["Python".to_string()];

        ctl.take_turn(&mut session, &cat, "add linux", &current).await.unwrap();
        ctl.take_turn(&mut session, &cat, "that's it", &current).await.unwrap();

        let requests = mock.recorded_requests();
        let requests = requests.lock();
        let notes = |i: usize| {
            requests[i]
                .messages
                .iter()
                .filter(|m| m.content.contains("currently hold: Python"))
                .count()
        };
        assert_eq!(notes(0), 1);
        assert_eq!(notes(1), 1);
    }

    #[tokio::test]
    async fn test_concluded_session_rejects_more_turns() {
        let mock = Arc::new(MockProvider::new("mock"));
        let ctl = controller(&mock);
        let mut session = ConversationState::new(ALICE, 3);
        session.abandon();
        assert!(ctl.take_turn(&mut session, &catalog(), "hi", &[]).await.is_err());
        assert_eq!(mock.request_count(), 0);
    }

    // ── Service ────────────────────────────────────────────────

    struct Harness {
        guild: Arc<MockGuild>,
        mock: Arc<MockProvider>,
        service: Arc<VerificationService>,
        _dir: tempfile::TempDir,
    }

    fn harness(guild: MockGuild, mock: MockProvider, max_turns: u32) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let guild = Arc::new(guild.with_roles(guild_roles()));
        let mock = Arc::new(mock);

        let mut config = RolecallConfig::default();
        config.verification.max_turns = max_turns;
        config.discord.notification_channel_id = Some(ADMIN_CHANNEL);
        config.roles.verified = Some(VERIFIED);
        config.roles.unverified = Some(UNVERIFIED);
        config.roles.in_progress = Some(IN_PROGRESS);

        let mut settings = ServiceSettings::from_config(&config, GUILD, "Rust Hub");
        settings.session_timeout = Duration::from_secs(5);
        settings.role_retry_delay = Duration::from_millis(1);
        settings.batch_delay = Duration::from_millis(1);

        let service = Arc::new(VerificationService::new(
            guild.clone(),
            oracle(&mock),
            Arc::new(Prompts::default()),
            CatalogStore::new(dir.path().join("categorized_roles.json")),
            settings,
        ));
        service.catalog().replace(catalog());
        Harness {
            guild,
            mock,
            service,
            _dir: dir,
        }
    }

    async fn start(h: &Harness, m: Member) -> tokio::task::JoinHandle<SessionReport> {
        match h.service.start_verification(m, StartOrigin::Command).await.unwrap() {
            StartOutcome::Started(handle) => handle.task,
            other => panic!("expected a started session, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_new_member_scenario_applies_three_roles() {
        let mock = MockProvider::new("mock")
            .with_tool_call(
                PROPOSE_USER_ROLES,
                &reply(&python_windows_beginner(), "Python, Windows, Beginner. Correct?", true, false),
            )
            .with_tool_call(PROPOSE_USER_ROLES, &reply("null", "Done! Welcome aboard.", true, true))
            .with_response("New Python beginner on Windows.");
        let h = harness(
            MockGuild::new().with_member(member(ALICE, &[UNVERIFIED])),
            mock,
            3,
        );

        let task = start(&h, member(ALICE, &[UNVERIFIED])).await;
        assert!(h.service.has_session(ALICE));
        assert!(h.guild.member_roles(ALICE).contains(&IN_PROGRESS));

        assert_eq!(
            h.service.forward_dm(ALICE, "Python on Windows, I'm a beginner".into()),
            DmDelivery::Delivered
        );
        assert_eq!(h.service.forward_dm(ALICE, "yes".into()), DmDelivery::Delivered);
        let report = task.await.unwrap();

        assert_eq!(report.state, DialogueState::Confirmed);
        assert_eq!(report.diff.add, vec![PYTHON, WINDOWS, BEGINNER]);
        assert!(report.diff.remove.is_empty());
        assert!(report.failures.is_empty());

        let mut roles = h.guild.member_roles(ALICE);
        roles.sort();
        assert_eq!(roles, vec![VERIFIED, PYTHON, WINDOWS, BEGINNER]);
        assert!(!h.service.has_session(ALICE));

        let embeds = h.guild.embeds_in(ADMIN_CHANNEL);
        let summary = embeds.last().unwrap();
        assert!(summary.title.as_deref().unwrap().starts_with("✅ New User Verified"));
        assert_eq!(summary.description.as_deref(), Some("New Python beginner on Windows."));

        let dms = h.guild.dms_to(ALICE);
        assert!(dms[0].contains("Rust Hub"));
        assert_eq!(dms.last().unwrap(), "Done! Welcome aboard.");
    }

    #[tokio::test]
    async fn test_update_with_same_roles_changes_nothing() {
        let held = [VERIFIED, PYTHON, WINDOWS, BEGINNER];
        let mock = MockProvider::new("mock")
            .with_tool_call(
                PROPOSE_USER_ROLES,
                &reply(&python_windows_beginner(), "Keep the same roles?", true, false),
            )
            .with_tool_call(PROPOSE_USER_ROLES, &reply("null", "Nothing changed.", true, true));
        let h = harness(MockGuild::new().with_member(member(ALICE, &held)), mock, 3);

        let task = match h
            .service
            .start_verification(member(ALICE, &held), StartOrigin::Command)
            .await
            .unwrap()
        {
            StartOutcome::Started(handle) => {
                assert!(handle.is_update);
                handle.task
            }
            other => panic!("unexpected {other:?}"),
        };
        h.service.forward_dm(ALICE, "same as before".into());
        h.service.forward_dm(ALICE, "yes".into());
        let report = task.await.unwrap();

        assert!(report.diff.is_empty());
        let skill_ops: Vec<_> = h
            .guild
            .role_ops_for(ALICE)
            .into_iter()
            .filter(|op| [PYTHON, WINDOWS, BEGINNER, LINUX].contains(&op.role))
            .collect();
        assert!(skill_ops.is_empty());
        // summary is only for new members
        assert_eq!(h.mock.request_count(), 2);
        let last = h.guild.embeds_in(ADMIN_CHANNEL).pop().unwrap();
        assert!(last.title.unwrap().starts_with("🔄 User Roles Updated"));
    }

    #[tokio::test]
    async fn test_final_attempt_without_information_changes_no_skill_roles() {
        let mock = MockProvider::new("mock").with_tool_call(
            PROPOSE_USER_ROLES,
            &reply("null", "I couldn't determine any roles.", true, true),
        );
        let h = harness(
            MockGuild::new().with_member(member(ALICE, &[UNVERIFIED])),
            mock,
            1,
        );
        let task = start(&h, member(ALICE, &[UNVERIFIED])).await;
        h.service.forward_dm(ALICE, "hmm".into());
        let report = task.await.unwrap();

        assert_eq!(report.state, DialogueState::Abandoned);
        assert!(report.diff.is_empty());
        assert_eq!(h.guild.member_roles(ALICE), vec![UNVERIFIED]);
        assert!(h.guild.dms_to(ALICE).last().unwrap().contains("/assign-roles"));
        let last = h.guild.embeds_in(ADMIN_CHANNEL).pop().unwrap();
        assert!(last.title.unwrap().starts_with("❌"));
    }

    #[tokio::test]
    async fn test_inactive_session_times_out() {
        let mut h = harness(
            MockGuild::new().with_member(member(ALICE, &[])),
            MockProvider::new("mock"),
            3,
        );
        // Rebuild with a short timeout.
        let mut settings = h.service.settings().clone();
        settings.session_timeout = Duration::from_millis(30);
        h.service = Arc::new(VerificationService::new(
            h.guild.clone(),
            oracle(&h.mock),
            Arc::new(Prompts::default()),
            CatalogStore::new(h._dir.path().join("c.json")),
            settings,
        ));
        h.service.catalog().replace(catalog());

        let task = start(&h, member(ALICE, &[])).await;
        let report = task.await.unwrap();

        assert_eq!(report.state, DialogueState::Abandoned);
        assert_eq!(report.turns, 0);
        assert_eq!(h.guild.dms_to(ALICE).last().unwrap(), TIMEOUT_MESSAGE);
        assert_eq!(h.guild.member_roles(ALICE), vec![UNVERIFIED]);
        assert_eq!(h.mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_role_failure_is_reported_and_others_still_apply() {
        let mock = MockProvider::new("mock")
            .with_tool_call(
                PROPOSE_USER_ROLES,
                &reply(&python_windows_beginner(), "Correct?", true, false),
            )
            .with_tool_call(PROPOSE_USER_ROLES, &reply("null", "Done.", true, true));
        let guild = MockGuild::new()
            .with_member(member(ALICE, &[UNVERIFIED]))
            .with_failing_role(PYTHON)
            .with_flaky_role(WINDOWS, 1);
        let h = harness(guild, mock, 3);

        let task = start(&h, member(ALICE, &[UNVERIFIED])).await;
        h.service.forward_dm(ALICE, "python windows beginner".into());
        h.service.forward_dm(ALICE, "yes".into());
        let report = task.await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].role, PYTHON);
        assert!(report.failures[0].added);

        let roles = h.guild.member_roles(ALICE);
        assert!(roles.contains(&WINDOWS), "transient failure should be retried");
        assert!(roles.contains(&BEGINNER));
        assert!(roles.contains(&VERIFIED));
        assert!(!roles.contains(&PYTHON));

        let titles: Vec<String> = h
            .guild
            .embeds_in(ADMIN_CHANNEL)
            .into_iter()
            .filter_map(|e| e.title)
            .collect();
        assert!(titles.iter().any(|t| t.contains("Role Assignment Incomplete")));
    }

    #[tokio::test]
    async fn test_unmappable_skill_alerts_moderators() {
        let payload = r#"{"classification":null,"message_to_user":"We have no Haskell role. What else?","is_complete":false,"user_has_confirmed":false,"unassignable_skills":[{"category":"Programming Language","skill":"Haskell"}]}"#;
        let mock = MockProvider::new("mock").with_tool_call(PROPOSE_USER_ROLES, payload);
        let h = harness(MockGuild::new().with_member(member(ALICE, &[])), mock, 3);

        let _task = start(&h, member(ALICE, &[])).await;
        h.service.forward_dm(ALICE, "I write Haskell".into());

        // Wait for the turn to be processed.
        for _ in 0..100 {
            if !h.guild.embeds_in(ADMIN_CHANNEL).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let alert = h.guild.embeds_in(ADMIN_CHANNEL).remove(0);
        assert_eq!(alert.title.as_deref(), Some("🔔 Unmappable Skill Alert"));
        assert!(alert.fields.iter().any(|f| f.name == "Skill Mentioned" && f.value.contains("Haskell")));
    }

    #[tokio::test]
    async fn test_start_guards() {
        let h = harness(
            MockGuild::new()
                .with_member(member(ALICE, &[]))
                .with_dm_blocked(UserId(7)),
            MockProvider::new("mock"),
            3,
        );

        let mut bot = member(UserId(9), &[]);
        bot.bot = true;
        assert!(matches!(
            h.service.start_verification(bot, StartOrigin::Command).await.unwrap(),
            StartOutcome::IsBot
        ));

        let _task = start(&h, member(ALICE, &[])).await;
        assert!(matches!(
            h.service.start_verification(member(ALICE, &[]), StartOrigin::Command).await.unwrap(),
            StartOutcome::AlreadyActive
        ));

        h.guild.add_member(member(UserId(7), &[]));
        assert!(matches!(
            h.service.start_verification(member(UserId(7), &[]), StartOrigin::Command).await.unwrap(),
            StartOutcome::DmUnavailable
        ));
        assert!(!h.service.has_session(UserId(7)));
        assert!(h.guild.member_roles(UserId(7)).contains(&UNVERIFIED));

        assert_eq!(h.service.forward_dm(UserId(8), "hello?".into()), DmDelivery::NoSession);
        assert!(matches!(
            h.service.verify_user(UserId(8)).await.unwrap(),
            StartOutcome::NotInGuild
        ));
    }

    #[tokio::test]
    async fn test_empty_catalog_blocks_verification() {
        let h = harness(MockGuild::new(), MockProvider::new("mock"), 3);
        h.service.catalog().replace(RoleCatalog::empty());
        assert!(matches!(
            h.service.start_verification(member(ALICE, &[]), StartOrigin::Command).await.unwrap(),
            StartOutcome::CatalogNotReady
        ));
        assert!(h.guild.role_ops().is_empty());
    }

    // ── Catalog & admin operations ─────────────────────────────

    #[tokio::test]
    async fn test_rebuild_catalog_classifies_and_persists() {
        let mock = MockProvider::new("mock").with_tool_call(
            "categorize_server_roles",
            r#"{"Programming Language":["python"],"Experience Level":["Beginner"],"Operating System":["Windows","Linux"]}"#,
        );
        let h = harness(MockGuild::new(), mock, 3);
        h.service.catalog().replace(RoleCatalog::empty());

        let stats = h.service.rebuild_catalog().await.unwrap();
        // status roles and @everyone are never offered
        assert_eq!(stats.offered, 5);
        assert_eq!(stats.operating_systems, 2);

        let cat = h.service.catalog().snapshot();
        assert!(cat.contains(PYTHON));
        assert!(!cat.contains(GAMING));
        assert_eq!(cat.name_of(PYTHON), Some("Python"));

        let prompt = h.mock.recorded_requests().lock()[0].clone();
        assert!(prompt.system.as_deref().unwrap().contains("Gaming"));
        assert!(!prompt.system.as_deref().unwrap().contains("Verifying"));

        let saved = CatalogStore::new(h._dir.path().join("categorized_roles.json"))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(saved, categorized());
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_catalog() {
        let mock = MockProvider::new("mock").with_tool_call(
            "categorize_server_roles",
            r#"{"Programming Language":["Python"]}"#,
        );
        let h = harness(MockGuild::new(), mock, 3);
        assert!(h.service.rebuild_catalog().await.is_err());
        assert_eq!(h.service.catalog().snapshot().len(), 4);
    }

    #[tokio::test]
    async fn test_load_catalog_prefers_persisted_file() {
        let h = harness(MockGuild::new(), MockProvider::new("mock"), 3);
        CatalogStore::new(h._dir.path().join("categorized_roles.json"))
            .save(&CategorizedRoles::new().with(Category::OperatingSystem, &["Linux"]))
            .unwrap();

        let stats = h.service.load_catalog(false).await.unwrap();
        assert_eq!(stats.operating_systems, 1);
        assert_eq!(h.service.catalog().snapshot().len(), 1);
        assert_eq!(h.mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_selects_unverified_members_only() {
        let guild = MockGuild::new()
            .with_member(member(UserId(1001), &[UNVERIFIED]))
            .with_member(member(UserId(1002), &[UNVERIFIED]))
            .with_member(member(UserId(1003), &[UNVERIFIED, IN_PROGRESS]))
            .with_member(member(UserId(1004), &[VERIFIED]))
            .with_member(member(UserId(1005), &[UNVERIFIED]));
        let h = harness(guild, MockProvider::new("mock"), 3);

        let report = h.service.initiate_batch(2).await.unwrap();
        assert_eq!(report.selected, 2);
        assert_eq!(report.started, 2);
        assert_eq!(h.service.active_sessions(), 2);
        assert!(!h.service.has_session(UserId(1003)));
        assert!(!h.service.has_session(UserId(1004)));
    }

    #[tokio::test]
    async fn test_reset_stale_verifications() {
        let guild = MockGuild::new()
            .with_member(member(UserId(2001), &[IN_PROGRESS]))
            .with_member(member(UserId(2002), &[]))
            .with_member(member(UserId(2003), &[VERIFIED]))
            .with_member(member(UserId(2004), &[UNVERIFIED]));
        let h = harness(guild, MockProvider::new("mock"), 3);

        assert_eq!(h.service.reset_stale().await.unwrap(), 2);
        assert_eq!(h.guild.member_roles(UserId(2001)), vec![UNVERIFIED]);
        assert_eq!(h.guild.member_roles(UserId(2002)), vec![UNVERIFIED]);
        assert_eq!(h.guild.member_roles(UserId(2003)), vec![VERIFIED]);
        assert!(h.guild.role_ops_for(UserId(2004)).is_empty());
    }

    #[tokio::test]
    async fn test_admin_check_uses_configured_roles() {
        let mut h = harness(MockGuild::new(), MockProvider::new("mock"), 3);
        let mut settings = h.service.settings().clone();
        settings.admin_roles = vec![RoleId(77)];
        h.service = Arc::new(VerificationService::new(
            h.guild.clone(),
            oracle(&h.mock),
            Arc::new(Prompts::default()),
            CatalogStore::new(h._dir.path().join("c.json")),
            settings,
        ));
        assert!(h.service.is_admin(&member(ALICE, &[RoleId(77)])));
        assert!(!h.service.is_admin(&member(ALICE, &[VERIFIED])));
    }
}
