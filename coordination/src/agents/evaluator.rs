//! Evaluator: reviews the expected expert solutions once and settles the
//! final answer.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{Agent, AgentContext, OracleClient};
use crate::error::AgentResult;
use crate::extract::{extract_answer, ANSWER_FORMAT};
use crate::ledger::ProgressLedger;
use crate::oracle::ChatMessage;
use crate::persona::Role;
use crate::protocol::{
    AgentId, Answer, Envelope, EvaluationRequest, ExpertSolution, Message, Topic,
    EVALUATION_INCOMPLETE,
};

/// Consolidated review prompt over `solutions`, in the given order.
pub fn review_prompt(question: &str, solutions: &[&ExpertSolution]) -> String {
    let mut prompt = format!(
        "Review the following expert solutions to a math problem.\nProblem: {}\n\n",
        question
    );
    for solution in solutions {
        prompt.push_str(&format!(
            "{} (answer: {}):\n{}\n\n",
            solution.expert_name, solution.answer, solution.solution
        ));
    }
    prompt.push_str("Check their reasoning and calculations, then decide the correct answer. ");
    prompt.push_str(ANSWER_FORMAT);
    prompt
}

pub struct Evaluator {
    id: AgentId,
    oracle: OracleClient,
    system: ChatMessage,
    /// First solution per expert, in arrival order.
    solutions: Vec<ExpertSolution>,
    request: Option<EvaluationRequest>,
    progress: ProgressLedger,
    done: bool,
}

impl Evaluator {
    pub fn new(oracle: OracleClient) -> Self {
        Self {
            id: Role::Evaluator.agent_id(),
            oracle,
            system: ChatMessage::system(Role::Evaluator.system_prompt()),
            solutions: Vec::new(),
            request: None,
            progress: ProgressLedger::new(),
            done: false,
        }
    }

    pub fn progress_ledger(&self) -> &ProgressLedger {
        &self.progress
    }

    fn is_expected(&self, expert: &AgentId) -> bool {
        self.request
            .as_ref()
            .map_or(true, |r| r.expected_experts.contains(expert))
    }

    fn on_solution(&mut self, solution: ExpertSolution) {
        if self.done {
            debug!(agent = %self.id, expert = %solution.expert_name, "Evaluation finished, solution ignored");
            return;
        }
        if !self.is_expected(&solution.expert_name) {
            debug!(agent = %self.id, expert = %solution.expert_name, "Unexpected expert ignored");
            return;
        }
        if self.solutions.iter().any(|s| s.expert_name == solution.expert_name) {
            debug!(agent = %self.id, expert = %solution.expert_name, "Duplicate solution ignored");
            return;
        }
        self.solutions.push(solution);
    }

    fn on_request(&mut self, request: EvaluationRequest) {
        if self.done {
            debug!(agent = %self.id, "Evaluation finished, request ignored");
            return;
        }
        self.solutions
            .retain(|s| request.expected_experts.contains(&s.expert_name));
        // Continue the orchestrator's ledger rather than starting a new one.
        self.progress = request.progress.clone();
        self.request = Some(request);
    }

    /// Expected solutions in the request's order, once all have arrived.
    fn ready(&self) -> Option<(&EvaluationRequest, Vec<&ExpertSolution>)> {
        let request = self.request.as_ref()?;
        let ordered: Option<Vec<&ExpertSolution>> = request
            .expected_experts
            .iter()
            .map(|e| self.solutions.iter().find(|s| &s.expert_name == e))
            .collect();
        ordered.map(|solutions| (request, solutions))
    }

    async fn try_evaluate(&mut self, ctx: &AgentContext) -> AgentResult<()> {
        if self.done {
            return Ok(());
        }
        let Some((request, solutions)) = self.ready() else {
            return Ok(());
        };

        let prompt = review_prompt(&request.question, &solutions);
        let expected = request.expected_experts.clone();
        let forced = request.forced;
        info!(agent = %self.id, experts = expected.len(), forced, "Evaluating");
        ctx.events().evaluation_started(&expected, forced);
        ctx.events().thinking(&self.id, 0);

        let conversation = [self.system.clone(), ChatMessage::user(prompt)];
        let content = self.oracle.complete(&conversation).await?;
        self.done = true;

        let answer = match extract_answer(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!(agent = %self.id, "Evaluation produced no answer: {}", e);
                EVALUATION_INCOMPLETE.to_string()
            }
        };
        ctx.events().response(&self.id, 0, &content, &answer);

        self.progress.task_complete = true;
        self.progress
            .update_progress("Evaluation complete", answer != EVALUATION_INCOMPLETE);
        self.progress.set_next_speaker("", "");
        ctx.events().progress_ledger(&self.progress);

        ctx.publish(Message::Answer(Answer::new(answer)), &Topic::answers());
        Ok(())
    }
}

#[async_trait]
impl Agent for Evaluator {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn handle(&mut self, envelope: Envelope, ctx: &AgentContext) -> AgentResult<()> {
        match envelope.message {
            Message::ExpertSolution(solution) => self.on_solution(solution),
            Message::EvaluationRequest(request) => self.on_request(request),
            other => {
                debug!(agent = %self.id, kind = other.kind(), "Ignored");
                return Ok(());
            }
        }
        self.try_evaluate(ctx).await
    }
}
