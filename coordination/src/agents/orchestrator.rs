//! Ledger-keeping orchestrator of the expert panel.
//!
//! On a question it asks the oracle for a labeled analysis, folds that
//! into fresh ledgers, and assigns experts. Each expert solution is a
//! completed step; once every assigned expert reported, or the progress
//! ledger reports a stall, it asks the evaluator to settle the answer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{Agent, AgentContext, OracleClient};
use crate::error::AgentResult;
use crate::ledger::{parse_analysis, ProgressLedger, TaskLedger};
use crate::lookup::FactLookup;
use crate::oracle::ChatMessage;
use crate::persona::Role;
use crate::protocol::{
    AgentId, Envelope, EvaluationRequest, ExpertAssignment, ExpertSolution, Message, Question,
    Topic,
};

fn analysis_prompt(question: &str) -> String {
    format!(
        "Analyze the following math problem before any expert works on it.\n\
         Problem: {}\n\
         List what is given, what must be looked up or derived, a short plan, and which \
         experts should solve it.",
        question
    )
}

pub struct Orchestrator {
    id: AgentId,
    oracle: OracleClient,
    lookup: Arc<dyn FactLookup>,
    default_expert: AgentId,
    system: ChatMessage,
    task: TaskLedger,
    progress: ProgressLedger,
    assignment: Option<ExpertAssignment>,
    /// Experts that reported, in arrival order.
    reported: Vec<AgentId>,
    evaluation_requested: bool,
}

impl Orchestrator {
    pub fn new(oracle: OracleClient, lookup: Arc<dyn FactLookup>, default_expert: Role) -> Self {
        Self {
            id: Role::Orchestrator.agent_id(),
            oracle,
            lookup,
            default_expert: default_expert.agent_id(),
            system: ChatMessage::system(Role::Orchestrator.system_prompt()),
            task: TaskLedger::default(),
            progress: ProgressLedger::default(),
            assignment: None,
            reported: Vec::new(),
            evaluation_requested: false,
        }
    }

    pub fn task_ledger(&self) -> &TaskLedger {
        &self.task
    }

    pub fn progress_ledger(&self) -> &ProgressLedger {
        &self.progress
    }

    async fn on_question(&mut self, question: Question, ctx: &AgentContext) -> AgentResult<()> {
        self.task = TaskLedger::new(question.content.clone());
        self.progress = ProgressLedger::new();
        self.assignment = None;
        self.reported.clear();
        self.evaluation_requested = false;

        ctx.events().thinking(&self.id, 0);
        let conversation = [
            self.system.clone(),
            ChatMessage::user(analysis_prompt(&question.content)),
        ];
        let content = self.oracle.complete(&conversation).await?;
        ctx.events().response(&self.id, 0, &content, "");

        let analysis = parse_analysis(&content);
        self.task.absorb(&analysis);
        for query in &analysis.facts_to_lookup {
            let result = self.lookup.lookup(query).await;
            debug!(agent = %self.id, query = %query, "Fact looked up");
            self.task.add_fact(result);
        }
        ctx.events().task_ledger(&self.task);

        let experts: Vec<AgentId> = analysis.assigned_experts.iter().map(|r| r.agent_id()).collect();
        if experts.is_empty() {
            info!(agent = %self.id, default = %self.default_expert, "No experts parsed, using default");
        }
        let assignment = ExpertAssignment::new(
            question.content,
            experts,
            &self.default_expert,
            analysis.reasoning.clone(),
            analysis.instruction.clone(),
        );

        let next = analysis
            .next_speaker
            .clone()
            .unwrap_or_else(|| assignment.assigned_experts[0].to_string());
        self.progress.set_next_speaker(next, analysis.instruction.clone());
        self.progress.update_progress(
            "Analyzed question and assigned experts",
            analysis.progress_being_made.unwrap_or(true),
        );
        ctx.events().progress_ledger(&self.progress);

        info!(
            agent = %self.id,
            experts = ?assignment.assigned_experts,
            facts = self.task.given_facts.len(),
            "Experts assigned"
        );
        ctx.events()
            .expert_assigned(&assignment.assigned_experts, &assignment.reasoning);
        ctx.publish(Message::ExpertAssignment(assignment.clone()), &Topic::assignments());
        self.assignment = Some(assignment);
        Ok(())
    }

    fn on_solution(&mut self, solution: ExpertSolution, ctx: &AgentContext) {
        let Some(assignment) = &self.assignment else {
            debug!(agent = %self.id, "Solution before any assignment ignored");
            return;
        };
        if !assignment.is_assigned(&solution.expert_name) {
            debug!(agent = %self.id, expert = %solution.expert_name, "Unassigned expert ignored");
            return;
        }
        if self.evaluation_requested {
            debug!(agent = %self.id, expert = %solution.expert_name, "Late solution after evaluation request");
            return;
        }
        if self.reported.contains(&solution.expert_name) {
            warn!(agent = %self.id, expert = %solution.expert_name, "Duplicate solution ignored");
            return;
        }

        self.reported.push(solution.expert_name.clone());
        let progressed = solution.answer.is_valid();
        self.progress.update_progress(
            format!("{} answered {}", solution.expert_name, solution.answer),
            progressed,
        );

        let all_reported = assignment
            .assigned_experts
            .iter()
            .all(|e| self.reported.contains(e));
        let question = assignment.question.clone();
        let pending: Vec<AgentId> = assignment
            .assigned_experts
            .iter()
            .filter(|e| !self.reported.contains(e))
            .cloned()
            .collect();

        let request = if all_reported {
            Some(EvaluationRequest {
                question,
                expected_experts: assignment.assigned_experts.clone(),
                forced: false,
                progress: ProgressLedger::default(),
            })
        } else if self.progress.check_stall() {
            warn!(
                agent = %self.id,
                stall_count = self.progress.stall_count,
                pending = ?pending,
                "Stall detected, forcing evaluation"
            );
            Some(EvaluationRequest {
                question,
                expected_experts: self.reported.clone(),
                forced: true,
                progress: ProgressLedger::default(),
            })
        } else {
            self.progress
                .set_next_speaker(pending[0].to_string(), "Provide your solution");
            None
        };

        match request {
            Some(mut request) => {
                self.evaluation_requested = true;
                self.progress.set_next_speaker(
                    Role::Evaluator.to_string(),
                    "Review the expert solutions and settle the final answer",
                );
                ctx.events().progress_ledger(&self.progress);
                request.progress = self.progress.clone();
                info!(agent = %self.id, forced = request.forced, "Evaluation requested");
                ctx.publish(Message::EvaluationRequest(request), &Topic::evaluation());
            }
            None => ctx.events().progress_ledger(&self.progress),
        }
    }
}

#[async_trait]
impl Agent for Orchestrator {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn handle(&mut self, envelope: Envelope, ctx: &AgentContext) -> AgentResult<()> {
        match envelope.message {
            Message::Question(question) => self.on_question(question, ctx).await,
            Message::ExpertSolution(solution) => {
                self.on_solution(solution, ctx);
                Ok(())
            }
            other => {
                debug!(agent = %self.id, kind = other.kind(), "Ignored");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{spawn_agent, FailureLog};
    use crate::bus::{MessageBus, SharedMessageBus};
    use crate::events::{EventBus, EventEmitter};
    use crate::lookup::KeywordLookup;
    use crate::oracle::ScriptedOracle;
    use crate::protocol::AnswerToken;
    use std::time::Duration;

    struct Harness {
        bus: SharedMessageBus,
        assignments: crate::bus::Mailbox,
        evaluations: crate::bus::Mailbox,
    }

    fn harness(analysis: &str) -> Harness {
        let bus = MessageBus::new().shared();
        let oracle = ScriptedOracle::new().script(Role::Orchestrator, [analysis.to_string()]);
        let client = OracleClient::new(Arc::new(oracle), Duration::from_secs(5));
        let agent = Orchestrator::new(client, Arc::new(KeywordLookup), Role::GeneralExpert);
        let id = agent.id().clone();
        let mailbox = bus.register(id.clone()).unwrap();
        bus.subscribe(&id, &Topic::orchestrator());
        bus.subscribe(&id, &Topic::solutions());

        let assign_id = AgentId::from("assign_sink");
        let assignments = bus.register(assign_id.clone()).unwrap();
        bus.subscribe(&assign_id, &Topic::assignments());
        let eval_id = AgentId::from("eval_sink");
        let evaluations = bus.register(eval_id.clone()).unwrap();
        bus.subscribe(&eval_id, &Topic::evaluation());

        let ctx = AgentContext::new(
            id,
            bus.clone(),
            EventEmitter::new(EventBus::new().shared(), "d-1"),
            FailureLog::default(),
        );
        spawn_agent(Box::new(agent), mailbox, ctx);
        Harness {
            bus,
            assignments,
            evaluations,
        }
    }

    fn solution(expert: Role, answer: AnswerToken) -> Message {
        Message::ExpertSolution(ExpertSolution {
            expert_name: expert.agent_id(),
            question: "q".into(),
            solution: "work".into(),
            answer,
        })
    }

    async fn next_assignment(h: &mut Harness) -> ExpertAssignment {
        let env = h.assignments.recv().await.unwrap();
        h.bus.complete();
        match env.message {
            Message::ExpertAssignment(a) => a,
            other => panic!("unexpected {:?}", other),
        }
    }

    async fn next_evaluation(h: &mut Harness) -> EvaluationRequest {
        let env = h.evaluations.recv().await.unwrap();
        h.bus.complete();
        match env.message {
            Message::EvaluationRequest(r) => r,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_default_expert_without_assigned_line() {
        let mut h = harness("GIVEN_FACTS:\n- 2 apples\nPROGRESS_BEING_MADE: yes");
        h.bus.publish(Message::Question(Question::new("q")), &Topic::orchestrator(), None);
        let assignment = next_assignment(&mut h).await;
        assert_eq!(assignment.assigned_experts, vec![Role::GeneralExpert.agent_id()]);
    }

    #[tokio::test]
    async fn test_all_reported_requests_evaluation() {
        let mut h = harness("ASSIGNED_EXPERTS: GeometryExpert, AlgebraExpert\nPROGRESS_BEING_MADE: yes");
        h.bus.publish(Message::Question(Question::new("q")), &Topic::orchestrator(), None);
        next_assignment(&mut h).await;

        // Unassigned and duplicate solutions do not count.
        h.bus.publish(solution(Role::GeneralExpert, AnswerToken::Value("1".into())), &Topic::solutions(), None);
        h.bus.publish(solution(Role::GeometryExpert, AnswerToken::Value("5".into())), &Topic::solutions(), None);
        h.bus.publish(solution(Role::GeometryExpert, AnswerToken::Value("5".into())), &Topic::solutions(), None);
        h.bus.publish(solution(Role::AlgebraExpert, AnswerToken::Value("5".into())), &Topic::solutions(), None);

        let request = next_evaluation(&mut h).await;
        assert!(!request.forced);
        assert_eq!(
            request.expected_experts,
            vec![Role::GeometryExpert.agent_id(), Role::AlgebraExpert.agent_id()]
        );
        // The hand-off carries the orchestrator's own ledger.
        assert_eq!(request.progress.completed_steps.len(), 3);
        assert_eq!(request.progress.next_speaker, "evaluator");
        assert!(!request.progress.task_complete);
        h.bus.wait_idle().await;
    }

    #[tokio::test]
    async fn test_stall_forces_evaluation() {
        let mut h = harness("ASSIGNED_EXPERTS: GeometryExpert, AlgebraExpert\nPROGRESS_BEING_MADE: yes");
        h.bus.publish(Message::Question(Question::new("q")), &Topic::orchestrator(), None);
        next_assignment(&mut h).await;

        h.bus.publish(solution(Role::AlgebraExpert, AnswerToken::NotFound), &Topic::solutions(), None);
        let request = next_evaluation(&mut h).await;
        assert!(request.forced);
        assert_eq!(request.expected_experts, vec![Role::AlgebraExpert.agent_id()]);
        assert_eq!(request.progress.stall_count, 1);
        assert!(request.progress.check_stall());

        // The straggler arrives after evaluation was requested.
        h.bus.publish(solution(Role::GeometryExpert, AnswerToken::Value("5".into())), &Topic::solutions(), None);
        h.bus.wait_idle().await;
    }

    #[tokio::test]
    async fn test_lookup_results_land_in_given_facts() {
        let mut orchestrator = Orchestrator::new(
            OracleClient::new(
                Arc::new(ScriptedOracle::new().script(
                    Role::Orchestrator,
                    ["GIVEN_FACTS:\n- side is 4\nFACTS_TO_LOOKUP:\n- area of a square"],
                )),
                Duration::from_secs(5),
            ),
            Arc::new(KeywordLookup),
            Role::GeneralExpert,
        );
        let bus = MessageBus::new().shared();
        let ctx = AgentContext::new(
            orchestrator.id().clone(),
            bus,
            EventEmitter::new(EventBus::new().shared(), "d-1"),
            FailureLog::default(),
        );
        orchestrator
            .on_question(Question::new("Area of a square of side 4?"), &ctx)
            .await
            .unwrap();

        let facts = &orchestrator.task_ledger().given_facts;
        assert_eq!(facts[0], "side is 4");
        assert!(facts[1].starts_with("Search results:"));
        assert_eq!(orchestrator.progress_ledger().completed_steps.len(), 1);
        assert!(!orchestrator.progress_ledger().check_stall());
    }
}
