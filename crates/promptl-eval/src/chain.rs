//! Multi-step prompts.
//!
//! A [`Chain`] compiles a prompt one `<step>` at a time. Each call to
//! [`Chain::step`] runs the template until the next step that has no
//! response yet; the caller sends the conversation to a model and passes
//! the model's answer to the following call.

use promptl_parser::{CompileError, Template};
use thiserror::Error;
use tracing::debug;

use crate::compile::{global_config, Compile, CompileOptions, Config, Parameters};
use crate::message::{Conversation, Message};
use crate::scope::{Pointers, Scope};
use crate::status::Statuses;
use crate::value::Value;

/// Misuse of the chain protocol, or a compile failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("The chain has already completed")]
    AlreadyCompleted,

    #[error("A response cannot be given on the first step")]
    UnexpectedResponse,

    #[error("A response is required to continue the chain")]
    MissingResponse,

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// What a single step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Global config merged with the current step's overrides, and every
    /// message produced so far.
    pub conversation: Conversation,
    pub completed: bool,
}

#[derive(Debug)]
pub struct Chain {
    template: Template,
    options: CompileOptions,
    statuses: Statuses,
    stash: Vec<Value>,
    /// Bindings of the prompt parameters.
    root_pointers: Pointers,
    global_config: Config,
    messages: Vec<Message>,
    steps: usize,
    completed: bool,
}

impl Chain {
    pub fn new(text: &str, parameters: Parameters) -> Result<Self, ChainError> {
        Self::with_options(text, parameters, CompileOptions::default())
    }

    pub fn with_options(
        text: &str,
        parameters: Parameters,
        options: CompileOptions,
    ) -> Result<Self, ChainError> {
        let template = promptl_parser::parse(text)?;
        let scope = Scope::new(parameters);
        Ok(Self {
            statuses: Statuses::new(template.node_count),
            global_config: global_config(&template),
            stash: scope.stash(),
            root_pointers: scope.pointers().clone(),
            template,
            options,
            messages: Vec::new(),
            steps: 0,
            completed: false,
        })
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Run until the next unanswered step, or to the end.
    ///
    /// The first call takes no response; every later call must carry the
    /// answer to the step the previous call stopped at.
    pub fn step(&mut self, response: Option<&str>) -> Result<StepResult, ChainError> {
        if self.completed {
            return Err(ChainError::AlreadyCompleted);
        }
        match (self.steps, response) {
            (0, Some(_)) => return Err(ChainError::UnexpectedResponse),
            (steps, None) if steps > 0 => return Err(ChainError::MissingResponse),
            _ => {}
        }

        let mut scope = Scope::from_stash(self.stash.clone());
        scope.set_pointers(self.root_pointers.clone());

        // A failed step leaves the chain as it was, so it can be retried.
        let mut statuses = self.statuses.clone();
        let outcome = Compile::new(&mut statuses, &self.options, response.map(str::to_string))
            .run(&self.template, &mut scope)?;

        self.statuses = statuses;
        self.stash = scope.stash();
        self.steps += 1;
        self.messages.extend(outcome.messages);
        self.completed |= outcome.completed;
        debug!(step = self.steps, completed = self.completed, "chain step finished");

        let mut config = self.global_config.clone();
        config.extend(outcome.step_config);
        Ok(StepResult {
            conversation: Conversation {
                config,
                messages: self.messages.clone(),
            },
            completed: self.completed,
        })
    }
}
