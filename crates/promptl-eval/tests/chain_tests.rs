/// Integration tests for multi-step chains

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use promptl_eval::{Chain, ChainError, ErrorCode, Message, MessageRole, Parameters, Value};
use serde_json::json;

fn texts(messages: &[Message]) -> Vec<(MessageRole, String)> {
    messages.iter().map(|m| (m.role, m.text())).collect()
}

#[test]
fn test_single_step_chain() {
    let source = r#"
<user>What is 2 + 2?</user>
<step />
<user>Now double it.</user>
"#;
    let mut chain = Chain::new(source, Parameters::new()).unwrap();

    let first = chain.step(None).unwrap();
    assert!(!first.completed);
    assert!(!chain.completed());
    assert_eq!(
        texts(&first.conversation.messages),
        vec![(MessageRole::User, "What is 2 + 2?".to_string())]
    );

    let second = chain.step(Some("4")).unwrap();
    assert!(second.completed);
    assert!(chain.completed());
    assert_eq!(
        texts(&second.conversation.messages),
        vec![
            (MessageRole::User, "What is 2 + 2?".to_string()),
            (MessageRole::Assistant, "4".to_string()),
            (MessageRole::User, "Now double it.".to_string()),
        ]
    );

    assert_eq!(chain.step(Some("8")).unwrap_err(), ChainError::AlreadyCompleted);
}

#[test]
fn test_step_binds_response() {
    let source = "<user>Pick a color</user>\n<step as=\"color\" />\n<user>Why {{ color }}?</user>";
    let mut chain = Chain::new(source, Parameters::new()).unwrap();
    chain.step(None).unwrap();
    let result = chain.step(Some("blue")).unwrap();
    assert_eq!(result.conversation.messages[2].text(), "Why blue?");
}

#[test]
fn test_variables_survive_pause() {
    let source = "{{ greeting = 'hi' }}<step />{{ greeting }} {{ name }}";
    let mut parameters = Parameters::new();
    parameters.insert("name".into(), Value::from("Ada"));

    let mut chain = Chain::new(source, parameters).unwrap();
    chain.step(None).unwrap();
    let result = chain.step(Some("ok")).unwrap();
    assert_eq!(
        texts(&result.conversation.messages),
        vec![
            (MessageRole::Assistant, "ok".to_string()),
            (MessageRole::System, "hi Ada".to_string()),
        ]
    );
}

#[test]
fn test_completed_nodes_are_not_evaluated_again() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut parameters = Parameters::new();
    parameters.insert(
        "tick".into(),
        Value::function(move |_| {
            Ok(Value::Number((counter.fetch_add(1, Ordering::SeqCst) + 1) as f64))
        }),
    );

    let source = "<user>{{ tick() }}</user>\n<step />\n<user>{{ tick() }}</user>\n<step />\n<user>{{ tick() }}</user>";
    let mut chain = Chain::new(source, parameters).unwrap();
    chain.step(None).unwrap();
    chain.step(Some("a")).unwrap();
    let result = chain.step(Some("b")).unwrap();

    assert!(result.completed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let user_texts: Vec<_> = result
        .conversation
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .map(Message::text)
        .collect();
    assert_eq!(user_texts, vec!["1", "2", "3"]);
}

#[test]
fn test_steps_inside_loop() {
    let source = r#"
{{ for topic in topics }}
  <user>Tell me about {{ topic }}</user>
  <step />
{{ endfor }}
<user>Summarize.</user>
"#;
    let mut parameters = Parameters::new();
    parameters.insert("topics".into(), Value::from(json!(["cats", "dogs"])));

    let mut chain = Chain::new(source, parameters).unwrap();
    assert!(!chain.step(None).unwrap().completed);
    assert!(!chain.step(Some("meow")).unwrap().completed);
    let result = chain.step(Some("woof")).unwrap();
    assert!(result.completed);
    assert_eq!(
        texts(&result.conversation.messages),
        vec![
            (MessageRole::User, "Tell me about cats".to_string()),
            (MessageRole::Assistant, "meow".to_string()),
            (MessageRole::User, "Tell me about dogs".to_string()),
            (MessageRole::Assistant, "woof".to_string()),
            (MessageRole::User, "Summarize.".to_string()),
        ]
    );
}

#[test]
fn test_branch_is_not_reevaluated_on_resume() {
    let source = "{{ flag = true }}{{ if flag }}{{ flag = false }}<step />then{{ else }}else{{ endif }}";
    let mut chain = Chain::new(source, Parameters::new()).unwrap();
    chain.step(None).unwrap();
    let result = chain.step(Some("r")).unwrap();
    assert_eq!(result.conversation.messages.last().unwrap().text(), "then");
}

#[test]
fn test_step_config_overrides_are_per_step() {
    let source = "---\nmodel: base\ntemperature: 1\n---\n<step model=\"fast\" temperature={{ 0.5 }} />\n<step />";
    let mut chain = Chain::new(source, Parameters::new()).unwrap();

    let first = chain.step(None).unwrap();
    assert_eq!(first.conversation.config.get("model"), Some(&json!("fast")));
    assert_eq!(first.conversation.config.get("temperature"), Some(&json!(0.5)));

    let second = chain.step(Some("one")).unwrap();
    assert_eq!(second.conversation.config.get("model"), Some(&json!("base")));
    assert_eq!(second.conversation.config.get("temperature"), Some(&json!(1)));

    let third = chain.step(Some("two")).unwrap();
    assert!(third.completed);
    assert_eq!(third.conversation.config.get("model"), Some(&json!("base")));
}

#[test]
fn test_step_children_are_sent_before_pause() {
    let source = "<step>\n  <user>Inside the step</user>\n</step>\nAfter";
    let mut chain = Chain::new(source, Parameters::new()).unwrap();
    let first = chain.step(None).unwrap();
    assert_eq!(
        texts(&first.conversation.messages),
        vec![(MessageRole::User, "Inside the step".to_string())]
    );
    let second = chain.step(Some("done")).unwrap();
    assert_eq!(
        texts(&second.conversation.messages),
        vec![
            (MessageRole::User, "Inside the step".to_string()),
            (MessageRole::Assistant, "done".to_string()),
            (MessageRole::System, "After".to_string()),
        ]
    );
}

#[test]
fn test_compile_errors_surface_through_chain() {
    let err = Chain::new("{{ if }}", Parameters::new()).unwrap_err();
    assert!(matches!(err, ChainError::Compile(_)));

    let mut chain = Chain::new("{{ missing }}", Parameters::new()).unwrap();
    match chain.step(None) {
        Err(ChainError::Compile(err)) => assert_eq!(err.code, ErrorCode::VariableNotDeclared),
        other => panic!("Expected compile error, got {:?}", other),
    }
}

/// Registers `name` as a host function counting its calls.
fn counting_function(parameters: &mut Parameters, name: &str) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    parameters.insert(
        name.into(),
        Value::function(move |_| {
            Ok(Value::Number((counter.fetch_add(1, Ordering::SeqCst) + 1) as f64))
        }),
    );
    calls
}

#[test]
fn test_loop_key_is_not_evaluated_again_on_resume() {
    let mut parameters = Parameters::new();
    let calls = counting_function(&mut parameters, "tick");

    let source = "{{ for x, i (tick()) in [1] }}<step />{{ i }}{{ endfor }}";
    let mut chain = Chain::new(source, parameters).unwrap();
    chain.step(None).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let result = chain.step(Some("r")).unwrap();
    assert!(result.completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        texts(&result.conversation.messages),
        vec![
            (MessageRole::Assistant, "r".to_string()),
            (MessageRole::System, "1".to_string()),
        ]
    );
}

#[test]
fn test_step_attributes_are_not_evaluated_again_on_resume() {
    let mut parameters = Parameters::new();
    let calls = counting_function(&mut parameters, "tick");

    let source = "<step temperature={{ tick() }} />\n<step />";
    let mut chain = Chain::new(source, parameters).unwrap();
    let first = chain.step(None).unwrap();
    assert_eq!(first.conversation.config.get("temperature"), Some(&json!(1)));

    let second = chain.step(Some("a")).unwrap();
    assert_eq!(second.conversation.config.get("temperature"), None);
    assert!(chain.step(Some("b")).unwrap().completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_step_can_be_retried() {
    let failed_once = Arc::new(AtomicUsize::new(0));
    let mut parameters = Parameters::new();
    parameters.insert(
        "flaky".into(),
        Value::function(move |_| match failed_once.fetch_add(1, Ordering::SeqCst) {
            0 => Err("temporarily unavailable".to_string()),
            _ => Ok(Value::from("recovered")),
        }),
    );

    let source = "<step />\n<user>kept</user>\n<user>{{ flaky() }}</user>";
    let mut chain = Chain::new(source, parameters).unwrap();
    chain.step(None).unwrap();

    match chain.step(Some("r")) {
        Err(ChainError::Compile(err)) => assert_eq!(err.code, ErrorCode::FunctionCallError),
        other => panic!("Expected compile error, got {:?}", other),
    }
    assert!(!chain.completed());

    let result = chain.step(Some("r")).unwrap();
    assert!(result.completed);
    assert_eq!(
        texts(&result.conversation.messages),
        vec![
            (MessageRole::Assistant, "r".to_string()),
            (MessageRole::User, "kept".to_string()),
            (MessageRole::User, "recovered".to_string()),
        ]
    );
}
