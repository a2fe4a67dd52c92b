//! Renders blocked validations as directives for the decision-maker.
//!
//! A block is not a generic error: the decision-maker is told which remediation
//! to perform before it may retry. The wording lives in a minijinja template so
//! hosts can read it alongside their other prompt material.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::reconcile::DiagnosticRegistry;
use crate::core::types::ValidationResult;

const BLOCKED_TEMPLATE: &str = include_str!("prompts/blocked_directive.md");

/// Template engine wrapper around minijinja.
pub struct DirectiveRenderer {
    env: Environment<'static>,
}

impl DirectiveRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("blocked", BLOCKED_TEMPLATE)
            .context("load blocked directive template")?;
        Ok(Self { env })
    }

    /// Render the directive for a blocked call. Allowed results yield `None`.
    ///
    /// `registry` supplies the context keys used to name the failing resource.
    pub fn render(
        &self,
        tool_name: &str,
        result: &ValidationResult,
        registry: &DiagnosticRegistry,
    ) -> Result<Option<String>> {
        if result.allowed {
            return Ok(None);
        }
        let failure = result.previous_failure.as_ref();
        let resource = failure.and_then(|record| registry.context_resource(&record.error));
        let code = failure.map(|record| record.error.code.as_str().to_string());
        let actions = result.required_actions.clone().unwrap_or_default();

        let template = self.env.get_template("blocked")?;
        let rendered = template
            .render(context! {
                tool => tool_name,
                reason => result.reason.as_deref().unwrap_or("the previous identical call failed"),
                resource => resource,
                code => code,
                actions => actions,
            })
            .with_context(|| format!("render blocked directive for {}", tool_name))?;
        Ok(Some(rendered.trim().to_string()))
    }
}
