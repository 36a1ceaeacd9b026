//! Expert panel end to end over a scripted oracle (no LLM calls).
//!
//! Covers: aggregator relay -> orchestrator analysis and ledgers ->
//! expert assignment -> evaluator review -> collector, plus the stall
//! path that forces evaluation over a partial set of experts.

use std::sync::Arc;

use async_trait::async_trait;
use debate_coordination::events::EventStats;
use debate_coordination::lookup::FactLookup;
use debate_coordination::{
    DebateEvent, DebateManager, EngineConfig, OracleError, Role, ScriptedOracle, Workflow,
};

fn panel_config() -> EngineConfig {
    EngineConfig {
        workflow: Workflow::ExpertPanel,
        ..Default::default()
    }
}

const TWO_EXPERTS: &str = "\
GIVEN_FACTS:
- The garden is 10 m by 6 m
FACTS_TO_LOOKUP:
- area formula for a rectangle
TASK_PLAN:
- compute the area
PROGRESS_BEING_MADE: yes
NEXT_SPEAKER: GeometryExpert
INSTRUCTION: Compute the garden area
ASSIGNED_EXPERTS: GeometryExpert, AlgebraExpert
REASONING: Area problem with a cross-check";

const THREE_EXPERTS: &str = "\
GIVEN_FACTS:
- A shape
ASSIGNED_EXPERTS: GeometryExpert, AlgebraExpert, GeneralExpert
REASONING: Everyone should look";

fn evaluation_started(events: &[DebateEvent]) -> Vec<(Vec<String>, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            DebateEvent::EvaluationStarted { experts, forced, .. } => Some((
                experts.iter().map(|a| a.to_string()).collect(),
                *forced,
            )),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_assigned_experts_then_evaluation() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(Role::Orchestrator, [TWO_EXPERTS])
            .repeat(Role::GeometryExpert, "10 x 6 = {{60}}")
            .repeat(Role::AlgebraExpert, "Let A = lw, A = {{60}}")
            .repeat(Role::Evaluator, "Both are right: {{60}}"),
    );
    let manager = DebateManager::new(panel_config(), oracle.clone()).unwrap();

    let outcome = manager.solve("A garden is 10 m by 6 m. What is its area?").await.unwrap();

    assert_eq!(outcome.answer_content(), Some("60"));
    assert!(outcome.failures.is_empty());
    // Orchestrator, two experts, evaluator; the general expert stays idle.
    assert_eq!(oracle.calls(), 4);

    let assigned: Vec<_> = outcome
        .events
        .iter()
        .filter_map(|e| match e {
            DebateEvent::ExpertAssigned { experts, reasoning, .. } => Some((experts.clone(), reasoning.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(assigned.len(), 1);
    assert_eq!(
        assigned[0].0,
        vec![Role::GeometryExpert.agent_id(), Role::AlgebraExpert.agent_id()]
    );
    assert_eq!(assigned[0].1, "Area problem with a cross-check");

    assert_eq!(
        evaluation_started(&outcome.events),
        vec![(vec!["geometry_expert".to_string(), "algebra_expert".to_string()], false)]
    );

    // The looked-up fact lands in the task ledger.
    let ledger = outcome
        .events
        .iter()
        .find_map(|e| match e {
            DebateEvent::TaskLedgerUpdated { ledger, .. } => Some(ledger.clone()),
            _ => None,
        })
        .unwrap();
    assert!(ledger
        .given_facts
        .iter()
        .any(|f| f.starts_with("Search results: area formula for a rectangle")));

    assert!(matches!(
        outcome.events.first(),
        Some(DebateEvent::DebateStarted { workflow: Workflow::ExpertPanel, .. })
    ));
    assert_eq!(EventStats::from_events(&outcome.events).events_by_type.get("debate_ended"), Some(&1));
}

#[tokio::test]
async fn test_unparseable_analysis_uses_default_expert() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(Role::Orchestrator, ["I would just add them."])
            .repeat(Role::GeneralExpert, "2 + 2 = {{4}}")
            .repeat(Role::Evaluator, "{{4}}"),
    );
    let manager = DebateManager::new(panel_config(), oracle.clone()).unwrap();

    let outcome = manager.solve("What is 2 + 2?").await.unwrap();

    assert_eq!(outcome.answer_content(), Some("4"));
    assert_eq!(oracle.calls(), 3);
    assert_eq!(
        evaluation_started(&outcome.events),
        vec![(vec!["general_expert".to_string()], false)]
    );
}

#[tokio::test]
async fn test_stall_forces_evaluation_over_reported_experts() {
    // Two experts fail outright and the third reports without an answer
    // marker. Every report counts as no progress, so the first one to
    // arrive triggers a forced review over just that expert.
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(Role::Orchestrator, [THREE_EXPERTS])
            .repeat(Role::GeometryExpert, "It depends on the shape.")
            .fail(Role::AlgebraExpert, OracleError::RequestFailed("connection reset".into()))
            .fail(Role::GeneralExpert, OracleError::Timeout(std::time::Duration::from_secs(1)))
            .repeat(Role::Evaluator, "Best effort: {{0}}"),
    );
    let manager = DebateManager::new(panel_config(), oracle).unwrap();

    let outcome = manager.solve("How big is it?").await.unwrap();

    assert_eq!(outcome.answer_content(), Some("0"));
    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome.failures.iter().all(|f| !f.fatal));

    let evaluations = evaluation_started(&outcome.events);
    assert_eq!(evaluations.len(), 1);
    let (experts, forced) = &evaluations[0];
    assert!(*forced);
    assert_eq!(experts.len(), 1);
    assert!(["geometry_expert", "algebra_expert", "general_expert"].contains(&experts[0].as_str()));

    let stalled = outcome.events.iter().any(|e| match e {
        DebateEvent::ProgressLedgerUpdated { ledger, .. } => ledger.stall_count > 0,
        _ => false,
    });
    assert!(stalled);
}

#[tokio::test]
async fn test_failed_expert_shows_as_stall() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(Role::Orchestrator, ["ASSIGNED_EXPERTS: AlgebraExpert"])
            .fail(Role::AlgebraExpert, OracleError::Timeout(std::time::Duration::from_secs(1)))
            .repeat(Role::Evaluator, "Working it out myself: {{7}}"),
    );
    let manager = DebateManager::new(panel_config(), oracle.clone()).unwrap();

    let outcome = manager.solve("What is 3 + 4?").await.unwrap();

    // The failed expert still reports, so evaluation is not forced.
    assert_eq!(outcome.answer_content(), Some("7"));
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].agent, Role::AlgebraExpert.agent_id());
    assert_eq!(
        evaluation_started(&outcome.events),
        vec![(vec!["algebra_expert".to_string()], false)]
    );
    assert_eq!(oracle.calls(), 3);

    let stall_seen = outcome.events.iter().any(|e| match e {
        DebateEvent::ProgressLedgerUpdated { ledger, .. } => {
            ledger.check_stall() && ledger.unproductive_loops == 1
        }
        _ => false,
    });
    assert!(stall_seen);
}

#[tokio::test]
async fn test_final_ledger_carries_every_step() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(Role::Orchestrator, [TWO_EXPERTS])
            .repeat(Role::GeometryExpert, "{{60}}")
            .repeat(Role::AlgebraExpert, "{{60}}")
            .repeat(Role::Evaluator, "{{60}}"),
    );
    let manager = DebateManager::new(panel_config(), oracle).unwrap();

    let outcome = manager.solve("Garden area?").await.unwrap();

    let last = outcome
        .events
        .iter()
        .rev()
        .find_map(|e| match e {
            DebateEvent::ProgressLedgerUpdated { ledger, .. } => Some(ledger.clone()),
            _ => None,
        })
        .unwrap();
    assert!(last.task_complete);
    assert_eq!(last.completed_steps.len(), 4);
    assert_eq!(last.completed_steps[0], "Analyzed question and assigned experts");
    assert_eq!(last.completed_steps[3], "Evaluation complete");
    assert!(last.completed_steps[1..3]
        .iter()
        .all(|step| step.ends_with("answered 60")));
}

#[tokio::test]
async fn test_unreviewable_verdict_is_incomplete() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(Role::Orchestrator, ["ASSIGNED_EXPERTS: AlgebraExpert"])
            .repeat(Role::AlgebraExpert, "x = {{3}}")
            .repeat(Role::Evaluator, "I cannot tell."),
    );
    let manager = DebateManager::new(panel_config(), oracle).unwrap();

    let outcome = manager.solve("Solve 2x = 6").await.unwrap();
    assert_eq!(
        outcome.answer_content(),
        Some(debate_coordination::protocol::EVALUATION_INCOMPLETE)
    );
}

#[tokio::test]
async fn test_orchestrator_failure_leaves_no_answer() {
    let oracle = Arc::new(
        ScriptedOracle::new().fail(Role::Orchestrator, OracleError::Status { status: 503, body: "busy".into() }),
    );
    let manager = DebateManager::new(panel_config(), oracle).unwrap();

    let outcome = manager.solve("Anything?").await.unwrap();

    assert_eq!(outcome.answer, None);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].agent, Role::Orchestrator.agent_id());
}

struct FixedLookup;

#[async_trait]
impl FactLookup for FixedLookup {
    async fn lookup(&self, query: &str) -> String {
        format!("fixed: {}", query)
    }
}

#[tokio::test]
async fn test_custom_lookup_feeds_task_ledger() {
    let oracle = Arc::new(
        ScriptedOracle::new()
            .script(Role::Orchestrator, [TWO_EXPERTS])
            .with_fallback("{{60}}"),
    );
    let manager = DebateManager::new(panel_config(), oracle)
        .unwrap()
        .with_lookup(Arc::new(FixedLookup));

    let outcome = manager.solve("Garden area?").await.unwrap();

    let facts: Vec<String> = outcome
        .events
        .iter()
        .find_map(|e| match e {
            DebateEvent::TaskLedgerUpdated { ledger, .. } => Some(ledger.given_facts.clone()),
            _ => None,
        })
        .unwrap();
    assert!(facts.contains(&"fixed: area formula for a rectangle".to_string()));
    assert_eq!(outcome.answer_content(), Some("60"));
}
