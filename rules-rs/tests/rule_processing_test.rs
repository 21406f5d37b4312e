//! End-to-end rule processing tests
//!
//! Drives the engine facade the way a delivery frontend would: create
//! folders and rules, deliver messages, then inspect the message store and
//! outbox for the effects.

use rules_rs::config::Config;
use rules_rs::engine::RuleEngine;
use rules_rs::rules::types::{
    FolderKind, MatchType, ModifyMode, ReplyFlavor, Restriction, Rule, RuleAction, RuleOp,
    RuleState,
};
use rules_rs::store::types::{props, Folder};
use rules_rs::store::OutboundKind;
use sqlx::SqlitePool;
use std::collections::HashMap;

const OWNER: &str = "user@example.com";

async fn setup() -> (RuleEngine, Folder) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();

    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let engine = RuleEngine::new(pool, Config::default());
    engine.init_db().await.unwrap();
    let inbox = engine
        .store()
        .create_folder(OWNER, "Inbox", FolderKind::Private)
        .await
        .unwrap();
    (engine, inbox)
}

fn rule(id: i64, sequence: u32, state: RuleState, actions: Vec<RuleAction>) -> Rule {
    Rule {
        id,
        sequence,
        name: format!("rule {}", id),
        state,
        condition: Restriction::True,
        actions,
        provider: "RuleOrganizer".to_string(),
        provider_data: vec![],
    }
}

fn incoming(sender: &str, subject: &str) -> HashMap<String, serde_json::Value> {
    let mut properties = HashMap::new();
    properties.insert(props::SENDER.to_string(), serde_json::json!(sender));
    properties.insert(props::SUBJECT.to_string(), serde_json::json!(subject));
    properties.insert(props::BODY.to_string(), serde_json::json!("message body"));
    properties
}

fn tag_importance(value: i64) -> RuleAction {
    RuleAction::Tag {
        property: props::IMPORTANCE.to_string(),
        value: serde_json::json!(value),
    }
}

async fn oof_reply_rule(engine: &RuleEngine, folder_id: i64, id: i64, sequence: u32) -> Rule {
    let template = engine
        .templates()
        .create_template(folder_id, "Out of Office", "I am away.", &[])
        .await
        .unwrap();

    rule(
        id,
        sequence,
        RuleState::ENABLED | RuleState::ONLY_WHEN_OOF | RuleState::KEEP_OOF_HIST,
        vec![RuleAction::Reply {
            template: template.template_ref(),
            oof: true,
            flavor: Default::default(),
        }],
    )
}

#[tokio::test]
async fn test_actions_apply_in_rule_order() {
    let (engine, inbox) = setup().await;

    engine
        .add_rules(
            inbox.id,
            &[
                rule(1, 10, RuleState::ENABLED, vec![tag_importance(2)]),
                rule(2, 20, RuleState::ENABLED, vec![RuleAction::MarkRead]),
            ],
        )
        .await
        .unwrap();

    let delivered = engine
        .deliver(inbox.id, incoming("sender@example.com", "hello"))
        .await
        .unwrap();

    let message = engine
        .store()
        .get_message(&delivered.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.property(props::IMPORTANCE), Some(&serde_json::json!(2)));
    assert!(message.is_read());
}

#[tokio::test]
async fn test_condition_filters_messages() {
    let (engine, inbox) = setup().await;

    let mut urgent = rule(1, 10, RuleState::ENABLED, vec![tag_importance(2)]);
    urgent.condition = Restriction::Content {
        property: props::SUBJECT.to_string(),
        match_type: MatchType::Contains,
        case_sensitive: false,
        value: "urgent".to_string(),
    };
    engine.add_rules(inbox.id, &[urgent]).await.unwrap();

    let matched = engine
        .deliver(inbox.id, incoming("a@example.com", "URGENT: server down"))
        .await
        .unwrap();
    let unmatched = engine
        .deliver(inbox.id, incoming("a@example.com", "lunch plans"))
        .await
        .unwrap();

    let matched = engine.store().get_message(&matched.id).await.unwrap().unwrap();
    let unmatched = engine
        .store()
        .get_message(&unmatched.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(matched.property(props::IMPORTANCE), Some(&serde_json::json!(2)));
    assert!(unmatched.property(props::IMPORTANCE).is_none());
}

#[tokio::test]
async fn test_exit_level_stops_later_rules() {
    let (engine, inbox) = setup().await;

    engine
        .add_rules(
            inbox.id,
            &[
                rule(
                    1,
                    10,
                    RuleState::ENABLED | RuleState::EXIT_LEVEL,
                    vec![tag_importance(2)],
                ),
                rule(2, 20, RuleState::ENABLED, vec![RuleAction::MarkRead]),
            ],
        )
        .await
        .unwrap();

    let delivered = engine
        .deliver(inbox.id, incoming("sender@example.com", "hello"))
        .await
        .unwrap();

    let message = engine
        .store()
        .get_message(&delivered.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.property(props::IMPORTANCE), Some(&serde_json::json!(2)));
    assert!(!message.is_read());
}

#[tokio::test]
async fn test_exit_level_during_oof_spares_oof_rules() {
    let (engine, inbox) = setup().await;
    engine.set_oof(OWNER, true).await.unwrap();

    let reply = oof_reply_rule(&engine, inbox.id, 3, 30).await;
    engine
        .add_rules(
            inbox.id,
            &[
                rule(
                    1,
                    10,
                    RuleState::ENABLED | RuleState::EXIT_LEVEL,
                    vec![tag_importance(2)],
                ),
                // Plain rule after the exit level: must not run
                rule(2, 20, RuleState::ENABLED, vec![RuleAction::MarkRead]),
                // OOF rule after the exit level: must still run
                reply,
            ],
        )
        .await
        .unwrap();

    let delivered = engine
        .deliver(inbox.id, incoming("sender@example.com", "hello"))
        .await
        .unwrap();

    let message = engine
        .store()
        .get_message(&delivered.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!message.is_read());

    let outbound = engine.outbox().list_for_mailbox(OWNER).await.unwrap();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].kind, OutboundKind::OofReply);
}

#[tokio::test]
async fn test_oof_rules_gated_by_oof_state() {
    let (engine, inbox) = setup().await;

    let reply = oof_reply_rule(&engine, inbox.id, 1, 10).await;
    engine.add_rules(inbox.id, &[reply]).await.unwrap();

    engine
        .deliver(inbox.id, incoming("sender@example.com", "before"))
        .await
        .unwrap();
    assert!(engine.outbox().list_for_mailbox(OWNER).await.unwrap().is_empty());

    engine.set_oof(OWNER, true).await.unwrap();
    engine
        .deliver(inbox.id, incoming("sender@example.com", "during"))
        .await
        .unwrap();
    assert_eq!(engine.outbox().list_for_mailbox(OWNER).await.unwrap().len(), 1);

    engine.set_oof(OWNER, false).await.unwrap();
    engine
        .deliver(inbox.id, incoming("sender@example.com", "after"))
        .await
        .unwrap();
    assert_eq!(engine.outbox().list_for_mailbox(OWNER).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_oof_history_replies_once_per_sender() {
    let (engine, inbox) = setup().await;
    engine.set_oof(OWNER, true).await.unwrap();

    let reply = oof_reply_rule(&engine, inbox.id, 1, 10).await;
    engine.add_rules(inbox.id, &[reply]).await.unwrap();

    engine
        .deliver(inbox.id, incoming("alice@example.com", "first"))
        .await
        .unwrap();
    engine
        .deliver(inbox.id, incoming("alice@example.com", "second"))
        .await
        .unwrap();
    engine
        .deliver(inbox.id, incoming("bob@example.com", "third"))
        .await
        .unwrap();

    let outbound = engine.outbox().list_for_mailbox(OWNER).await.unwrap();
    assert_eq!(outbound.len(), 2);
    assert_eq!(outbound[0].recipients, vec!["alice@example.com"]);
    assert_eq!(outbound[1].recipients, vec!["bob@example.com"]);
}

#[tokio::test]
async fn test_new_oof_period_replies_again() {
    let (engine, inbox) = setup().await;

    let reply = oof_reply_rule(&engine, inbox.id, 1, 10).await;
    engine.add_rules(inbox.id, &[reply]).await.unwrap();

    engine.set_oof(OWNER, true).await.unwrap();
    engine
        .deliver(inbox.id, incoming("alice@example.com", "first trip"))
        .await
        .unwrap();

    // Coming back and leaving again starts a fresh history
    engine.set_oof(OWNER, false).await.unwrap();
    engine.set_oof(OWNER, true).await.unwrap();
    engine
        .deliver(inbox.id, incoming("alice@example.com", "second trip"))
        .await
        .unwrap();

    assert_eq!(engine.outbox().list_for_mailbox(OWNER).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_oof_reply_carries_oof_message_class() {
    let (engine, inbox) = setup().await;
    engine.set_oof(OWNER, true).await.unwrap();

    let reply = oof_reply_rule(&engine, inbox.id, 1, 10).await;
    engine.add_rules(inbox.id, &[reply]).await.unwrap();

    engine
        .deliver(inbox.id, incoming("alice@example.com", "hello"))
        .await
        .unwrap();

    let outbound = engine.outbox().list_for_mailbox(OWNER).await.unwrap();
    assert_eq!(outbound[0].message_class, props::OOF_REPLY_CLASS);
    assert_eq!(outbound[0].subject, "Out of Office");
}

#[tokio::test]
async fn test_suppress_bit_blocks_reply() {
    let (engine, inbox) = setup().await;
    engine.set_oof(OWNER, true).await.unwrap();

    let reply = oof_reply_rule(&engine, inbox.id, 1, 10).await;
    engine.add_rules(inbox.id, &[reply]).await.unwrap();

    let mut properties = incoming("list@example.com", "newsletter");
    properties.insert(
        props::AUTO_RESPONSE_SUPPRESS.to_string(),
        serde_json::json!(props::SUPPRESS_OOF_REPLY_BIT),
    );
    engine.deliver(inbox.id, properties).await.unwrap();

    assert!(engine.outbox().list_for_mailbox(OWNER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scl_safe_skips_flagged_rule() {
    let (engine, inbox) = setup().await;

    engine
        .add_rules(
            inbox.id,
            &[rule(
                1,
                10,
                RuleState::ENABLED | RuleState::SKIP_IF_SCL_IS_SAFE,
                vec![RuleAction::Delete],
            )],
        )
        .await
        .unwrap();

    let mut safe = incoming("friend@example.com", "hi");
    safe.insert(
        props::SPAM_CONFIDENCE_LEVEL.to_string(),
        serde_json::json!(props::SCL_SAFE),
    );
    let kept = engine.deliver(inbox.id, safe).await.unwrap();
    assert!(engine.store().get_message(&kept.id).await.unwrap().is_some());

    let removed = engine
        .deliver(inbox.id, incoming("stranger@example.com", "hi"))
        .await
        .unwrap();
    assert!(engine.store().get_message(&removed.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_move_ends_evaluation_for_message() {
    let (engine, inbox) = setup().await;
    let archive = engine
        .store()
        .create_folder(OWNER, "Archive", FolderKind::Private)
        .await
        .unwrap();

    engine
        .add_rules(
            inbox.id,
            &[
                rule(
                    1,
                    10,
                    RuleState::ENABLED,
                    vec![RuleAction::MoveOrCopy {
                        folder_id: archive.id,
                        is_copy: false,
                    }],
                ),
                rule(2, 20, RuleState::ENABLED, vec![RuleAction::MarkRead]),
            ],
        )
        .await
        .unwrap();

    let delivered = engine
        .deliver(inbox.id, incoming("sender@example.com", "file me"))
        .await
        .unwrap();

    let message = engine
        .store()
        .get_message(&delivered.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.folder_id, archive.id);
    // The second rule saw the message leave the folder and did not run
    assert!(!message.is_read());
}

#[tokio::test]
async fn test_failed_action_is_recorded_and_evaluation_continues() {
    let (engine, inbox) = setup().await;

    engine
        .add_rules(
            inbox.id,
            &[
                rule(
                    1,
                    10,
                    RuleState::ENABLED,
                    vec![RuleAction::MoveOrCopy {
                        folder_id: 9999,
                        is_copy: false,
                    }],
                ),
                rule(2, 20, RuleState::ENABLED, vec![RuleAction::MarkRead]),
            ],
        )
        .await
        .unwrap();

    let delivered = engine
        .deliver(inbox.id, incoming("sender@example.com", "hello"))
        .await
        .unwrap();

    let errors = engine.store().list_rule_errors(inbox.id).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rule_id, 1);
    assert_eq!(errors[0].action, "move");

    // Delivery itself succeeded and the next rule still ran
    let message = engine
        .store()
        .get_message(&delivered.id)
        .await
        .unwrap()
        .unwrap();
    assert!(message.is_read());
}

#[tokio::test]
async fn test_public_folder_rejects_whole_batch() {
    let (engine, _) = setup().await;
    let board = engine
        .store()
        .create_folder(OWNER, "Announcements", FolderKind::Public)
        .await
        .unwrap();

    let result = engine
        .add_rules(
            board.id,
            &[
                rule(1, 10, RuleState::ENABLED, vec![RuleAction::MarkRead]),
                rule(
                    2,
                    20,
                    RuleState::ENABLED,
                    vec![RuleAction::MoveOrCopy {
                        folder_id: 1,
                        is_copy: true,
                    }],
                ),
            ],
        )
        .await;

    assert!(result.is_err());
    assert!(engine.get_rules(board.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replace_all_swaps_rule_set() {
    let (engine, inbox) = setup().await;

    engine
        .add_rules(
            inbox.id,
            &[
                rule(1, 10, RuleState::ENABLED, vec![RuleAction::MarkRead]),
                rule(2, 20, RuleState::ENABLED, vec![RuleAction::Delete]),
            ],
        )
        .await
        .unwrap();

    engine
        .modify_rules(
            inbox.id,
            &[RuleOp::Add(rule(
                5,
                10,
                RuleState::ENABLED,
                vec![tag_importance(1)],
            ))],
            ModifyMode::ReplaceAll,
        )
        .await
        .unwrap();

    let rules = engine.get_rules(inbox.id).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, 5);
}

#[tokio::test]
async fn test_standard_reply_goes_back_to_sender() {
    let (engine, inbox) = setup().await;

    let template = engine
        .templates()
        .create_template(inbox.id, "", "Got it, thanks.", &[])
        .await
        .unwrap();
    engine
        .add_rules(
            inbox.id,
            &[rule(
                1,
                10,
                RuleState::ENABLED,
                vec![RuleAction::Reply {
                    template: template.template_ref(),
                    oof: false,
                    flavor: ReplyFlavor::Standard,
                }],
            )],
        )
        .await
        .unwrap();

    engine
        .deliver(inbox.id, incoming("alice@example.com", "question"))
        .await
        .unwrap();

    let outbound = engine.outbox().list_for_mailbox(OWNER).await.unwrap();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].kind, OutboundKind::Reply);
    assert_eq!(outbound[0].recipients, vec!["alice@example.com"]);
    assert_eq!(outbound[0].message_class, "IPM.Note");
    // Empty template subject falls back to the original subject
    assert_eq!(outbound[0].subject, "Re: question");
}

#[tokio::test]
async fn test_no_sender_reply_uses_template_recipients_only() {
    let (engine, inbox) = setup().await;
    engine.set_oof(OWNER, true).await.unwrap();

    let template = engine
        .templates()
        .create_template(
            inbox.id,
            "Out of Office",
            "Contact my colleague.",
            &["helper@example.com".to_string()],
        )
        .await
        .unwrap();
    engine
        .add_rules(
            inbox.id,
            &[rule(
                1,
                10,
                RuleState::ENABLED | RuleState::ONLY_WHEN_OOF,
                vec![RuleAction::Reply {
                    template: template.template_ref(),
                    oof: true,
                    flavor: ReplyFlavor::NoSenderReply,
                }],
            )],
        )
        .await
        .unwrap();

    engine
        .deliver(inbox.id, incoming("alice@example.com", "hello"))
        .await
        .unwrap();

    let outbound = engine.outbox().list_for_mailbox(OWNER).await.unwrap();
    assert_eq!(outbound.len(), 1);
    // The message sender gets nothing; the template recipients get the reply
    assert_eq!(outbound[0].recipients, vec!["helper@example.com"]);
}

#[tokio::test]
async fn test_no_sender_reply_with_empty_template_sends_nothing() {
    let (engine, inbox) = setup().await;
    engine.set_oof(OWNER, true).await.unwrap();

    let template = engine
        .templates()
        .create_template(inbox.id, "Out of Office", "I am away.", &[])
        .await
        .unwrap();
    engine
        .add_rules(
            inbox.id,
            &[rule(
                1,
                10,
                RuleState::ENABLED | RuleState::ONLY_WHEN_OOF,
                vec![RuleAction::Reply {
                    template: template.template_ref(),
                    oof: true,
                    flavor: ReplyFlavor::NoSenderReply,
                }],
            )],
        )
        .await
        .unwrap();

    engine
        .deliver(inbox.id, incoming("alice@example.com", "hello"))
        .await
        .unwrap();

    assert!(engine.outbox().list_for_mailbox(OWNER).await.unwrap().is_empty());
    // Suppressed, not failed: no error record
    assert!(engine.store().list_rule_errors(inbox.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delivery_survives_rule_processing_failure() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let engine = RuleEngine::new(pool.clone(), Config::default());
    engine.init_db().await.unwrap();
    let inbox = engine
        .store()
        .create_folder(OWNER, "Inbox", FolderKind::Private)
        .await
        .unwrap();

    // Break rule storage out from under the engine
    sqlx::query("DROP TABLE rules").execute(&pool).await.unwrap();

    let delivered = engine
        .deliver(inbox.id, incoming("sender@example.com", "hello"))
        .await
        .unwrap();
    assert!(engine
        .store()
        .get_message(&delivered.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_disabled_rule_is_skipped() {
    let (engine, inbox) = setup().await;

    engine
        .add_rules(
            inbox.id,
            &[rule(1, 10, RuleState::default(), vec![RuleAction::MarkRead])],
        )
        .await
        .unwrap();

    let delivered = engine
        .deliver(inbox.id, incoming("sender@example.com", "hello"))
        .await
        .unwrap();

    let message = engine
        .store()
        .get_message(&delivered.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!message.is_read());
}
