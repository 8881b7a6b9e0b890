//! End-to-end coverage across process boundaries that the per-module unit
//! tests don't exercise together: producers writing real events into a
//! file-backed journal, a brain cycle reading them back out, a paper fill
//! routed through the full execution pipeline, and the resulting chain
//! still verifying after all of it.

use serde_json::json;
use tempfile::tempdir;

use sovereign_engine::brain::BrainOrchestrator;
use sovereign_engine::config::Config;
use sovereign_engine::execution::{
    default_sizer_from_risk, KarmaEngine, Oms, OmsStatus, PaperBroker, Preflight,
};
use sovereign_engine::identity::NodeIdentity;
use sovereign_engine::journal::Journal;
use sovereign_engine::kill_switch::{KillSwitch, KillSwitchInputs, KillSwitchLevel};
use sovereign_engine::execution::PnlTracker;
use sovereign_engine::producers::build_registry;

#[tokio::test]
async fn producers_write_one_signal_event_per_domain_and_the_chain_stays_verified() {
    let dir = tempdir().unwrap();
    let journal = Journal::open(&dir.path().join("journal.sqlite3")).unwrap();

    let registry = build_registry(5);
    let results = registry.run_all(&journal).await;
    assert_eq!(results.len(), 6, "one result per registered producer");
    assert!(
        results.iter().all(|r| r.event_id.is_some()),
        "every producer should have appended an event: {results:?}"
    );

    journal.verify_chain().unwrap();
}

#[test]
fn a_brain_cycle_against_a_cold_journal_runs_clean_and_emits_no_intent() {
    let dir = tempdir().unwrap();
    let journal = Journal::open(&dir.path().join("journal.sqlite3")).unwrap();
    let config = Config::from_repo_defaults();

    let outcome = BrainOrchestrator::default().run_cycle(&journal, &config, "BTC").unwrap();
    // With no signals at all, data quality forces every domain unusable
    // and synthesis can't produce a tradeable conviction.
    assert!(outcome.trade_intent.is_none());

    journal.verify_chain().unwrap();
}

#[test]
fn a_filled_position_flows_through_close_karma_and_settlement_with_a_clean_chain() {
    let dir = tempdir().unwrap();
    let journal = Journal::open(&dir.path().join("journal.sqlite3")).unwrap();
    let mut config = Config::from_repo_defaults();
    config.karma.enabled = true;
    config.karma.treasury_address = Some("0xtreasury".to_string());

    let oms = Oms::new(
        Preflight::new(config.risk.clone(), None),
        default_sizer_from_risk(config.risk.max_position_pct_of_equity),
        PaperBroker::default(),
    );

    let intent = sovereign_engine::brain::decision::DecisionPolicy::decide(
        "BTC",
        &sovereign_engine::brain::conviction::ConvictionResult {
            pcs: 92.0,
            cts: 80.0,
            final_conviction: 88.0,
            direction: "long",
            magnitude: 7.6,
            timeframe: "4h".to_string(),
            confidence: 1.0,
            domains_used: vec!["technical".to_string()],
            commitment_hash: "test".to_string(),
        },
        sovereign_engine::projections::Regime::Bull,
        KillSwitchLevel::Safe,
        &config.brain,
        &config.risk,
    )
    .expect("high conviction in a bull regime should produce an intent");

    let status = oms
        .submit(
            &journal,
            &config,
            &intent,
            50_000.0,
            100_000.0,
            0.0,
            KillSwitchLevel::Safe,
            0.0,
            0.0,
            &json!({"technical": 0.9}),
            None,
        )
        .unwrap();

    let OmsStatus::Filled { position_id, .. } = status else {
        panic!("expected a fill, got {status:?}");
    };

    let realized = PnlTracker.close_position(&journal, &position_id, 60_000.0).unwrap();
    assert!(realized > 0.0, "long entry below exit should realize a profit");

    let identity = NodeIdentity::generate(None).unwrap();
    let karma = KarmaEngine::new(&config, &identity);
    let karma_intent = karma
        .record_intent(&journal, &position_id, realized)
        .expect("a profitable close with karma enabled should record an intent");
    assert!(karma_intent.amount_usd > 0.0);

    // Paper mode never settles, by contract — only live mode pays out.
    assert!(karma.settle(&journal, &karma_intent).is_none());

    journal.verify_chain().unwrap();
}

#[test]
fn kill_switch_escalation_blocks_new_fills_but_the_chain_still_verifies() {
    let dir = tempdir().unwrap();
    let journal = Journal::open(&dir.path().join("journal.sqlite3")).unwrap();
    let config = Config::from_repo_defaults();

    let mut kill_switch = KillSwitch::restore(config.kill_switch.clone(), &journal);
    kill_switch
        .evaluate(
            &journal,
            KillSwitchInputs {
                portfolio_heat_pct: Some(0.99),
                ..Default::default()
            },
        )
        .unwrap()
        .expect("portfolio heat above the L2 threshold should escalate to DEFENSIVE");
    assert_eq!(kill_switch.level(), KillSwitchLevel::Defensive);

    let oms = Oms::new(
        Preflight::new(config.risk.clone(), None),
        default_sizer_from_risk(config.risk.max_position_pct_of_equity),
        PaperBroker::default(),
    );
    let intent = sovereign_engine::brain::decision::TradeIntent {
        symbol: "BTC".to_string(),
        direction: "long",
        size_pct: 0.02,
        leverage: 1.0,
        conviction_score: 80.0,
        regime: "BULL",
        rationale: "test".to_string(),
        requires_approval: false,
        stop_loss_pct: 0.05,
        take_profit_pct: 0.10,
    };

    let status = oms
        .submit(
            &journal,
            &config,
            &intent,
            50_000.0,
            100_000.0,
            0.0,
            kill_switch.level(),
            0.0,
            0.0,
            &json!({}),
            None,
        )
        .unwrap();
    assert!(matches!(status, OmsStatus::Rejected { .. }));

    // Restoring a fresh kill switch from the journal must still see the
    // escalation — it's the one piece of kill-switch state that persists.
    let restored = KillSwitch::restore(config.kill_switch.clone(), &journal);
    assert_eq!(restored.level(), KillSwitchLevel::Defensive);

    journal.verify_chain().unwrap();
}
