/// Integration tests for reading prompt metadata

use pretty_assertions::assert_eq;
use promptl_compiler::{
    read_metadata, MapResolver, MetadataOptions, ReferenceResolver, ResolveError, ResolvedPrompt, SchemaValidation,
};
use promptl_eval::{compile, ErrorCode, Parameters, Value};
use serde_json::json;

async fn metadata(source: &str) -> promptl_compiler::ConversationMetadata {
    read_metadata(source, &MetadataOptions::new())
        .await
        .expect("reading metadata failed")
}

async fn metadata_with(source: &str, resolver: MapResolver) -> promptl_compiler::ConversationMetadata {
    read_metadata(source, &MetadataOptions::new().resolver(resolver))
        .await
        .expect("reading metadata failed")
}

async fn metadata_error(source: &str, resolver: MapResolver) -> ErrorCode {
    read_metadata(source, &MetadataOptions::new().resolver(resolver))
        .await
        .expect_err("reading metadata should fail")
        .code
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[tokio::test]
async fn test_free_variables_are_parameters() {
    let source = r#"
{{ greeting = "Hello" }}
<system>{{ greeting }}, {{ user.name }}!</system>
{{ for item, i in items }}
  <user>{{ i }}: {{ item }} {{ suffix }}</user>
{{ endfor }}
"#;
    let meta = metadata(source).await;
    assert_eq!(
        meta.parameters.into_iter().collect::<Vec<_>>(),
        names(&["items", "suffix", "user"])
    );
}

#[tokio::test]
async fn test_branches_do_not_leak_declarations() {
    let source = "{{ if flag }}{{ x = 1 }}{{ endif }}{{ x }}";
    let meta = metadata(source).await;
    assert_eq!(meta.parameters.into_iter().collect::<Vec<_>>(), names(&["flag", "x"]));
}

#[tokio::test]
async fn test_step_as_declares_name() {
    let meta = metadata("<step as=\"answer\">Think</step>{{ answer }}").await;
    assert!(meta.parameters.is_empty());
}

#[tokio::test]
async fn test_config_is_read() {
    let meta = metadata("---\nmodel: gpt-4o\ntemperature: 0.3\n---\nHi").await;
    assert_eq!(meta.config.get("model"), Some(&json!("gpt-4o")));
    assert_eq!(meta.config.get("temperature"), Some(&json!(0.3)));
    assert_eq!(meta.schema_validation, None);
}

#[tokio::test]
async fn test_identical_sources_hash_equal() {
    let a = metadata("Hello {{ name }}").await;
    let b = metadata("Hello {{ name }}").await;
    let c = metadata("Hello {{ name }}!").await;
    assert_eq!(a.hash, b.hash);
    assert_ne!(a.hash, c.hash);
    assert_eq!(a.hash.len(), 64);
}

#[tokio::test]
async fn test_child_change_changes_parent_hash() {
    let parent = "Intro <ref prompt=\"child\" />";
    let first = metadata_with(parent, MapResolver::new().with_prompt("child", "one")).await;
    let second = metadata_with(parent, MapResolver::new().with_prompt("child", "two")).await;
    assert_ne!(first.hash, second.hash);

    let nested = "<ref prompt=\"middle\" />";
    let first = metadata_with(
        nested,
        MapResolver::new()
            .with_prompt("middle", "<ref prompt=\"leaf\" />")
            .with_prompt("leaf", "a"),
    )
    .await;
    let second = metadata_with(
        nested,
        MapResolver::new()
            .with_prompt("middle", "<ref prompt=\"leaf\" />")
            .with_prompt("leaf", "b"),
    )
    .await;
    assert_ne!(first.hash, second.hash);
}

#[tokio::test]
async fn test_referenced_prompts_are_transitive() {
    let resolver = MapResolver::new()
        .with_prompt("shared/header", "<ref prompt=\"footer\" />")
        .with_prompt("shared/footer", "bye")
        .with_prompt("other", "x");
    let meta = metadata_with(
        "<ref prompt=\"shared/header\" /><ref prompt=\"other\" /><ref prompt=\"other\" />",
        resolver,
    )
    .await;
    assert_eq!(
        meta.referenced_prompts.into_iter().collect::<Vec<_>>(),
        names(&["other", "shared/footer", "shared/header"])
    );
}

#[tokio::test]
async fn test_child_parameters_fold_into_parent() {
    let resolver = MapResolver::new().with_prompt("child", "{{ user }} {{ topic }} {{ tone }}");
    let source = "{{ user = 'Ada' }}<ref prompt=\"child\" topic={{ subject }} />";
    let meta = metadata_with(source, resolver).await;
    assert_eq!(meta.parameters.into_iter().collect::<Vec<_>>(), names(&["subject", "tone"]));
}

#[tokio::test]
async fn test_resolved_prompt_compiles() {
    let resolver = MapResolver::new().with_prompt("greeting", "---\ntemperature: 1\n---\nHi {{ who }}");
    let source = "---\nmodel: m\n---\n<user>Hello. <ref prompt=\"greeting\" who={{ name }} /></user>";
    let meta = metadata_with(source, resolver).await;
    assert_eq!(
        meta.resolved_prompt,
        "---\nmodel: m\n---\n<user>Hello. {{ who = name }}Hi {{ who }}</user>"
    );

    let mut parameters = Parameters::new();
    parameters.insert("name".to_string(), Value::from("Bob"));
    let conversation = compile(&meta.resolved_prompt, parameters).unwrap();
    assert_eq!(conversation.messages[0].text(), "Hello. Hi Bob");
}

#[tokio::test]
async fn test_reference_errors() {
    let err = read_metadata("<ref prompt=\"child\" />", &MetadataOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingReferenceFunction);

    assert_eq!(
        metadata_error("<ref prompt=\"missing\" />", MapResolver::new()).await,
        ErrorCode::ReferenceNotFound
    );
    assert_eq!(
        metadata_error("<ref prompt={{ name }} />", MapResolver::new()).await,
        ErrorCode::InvalidStaticAttribute
    );
    assert_eq!(metadata_error("<ref />", MapResolver::new()).await, ErrorCode::ReferenceTagWithoutPrompt);
}

#[tokio::test]
async fn test_circular_references() {
    let resolver = MapResolver::new()
        .with_prompt("a", "<ref prompt=\"b\" />")
        .with_prompt("b", "<ref prompt=\"a\" />");
    assert_eq!(metadata_error("<ref prompt=\"a\" />", resolver).await, ErrorCode::CircularReference);

    let resolver = MapResolver::new().with_prompt("self", "again <ref prompt=\"self\" />");
    let err = read_metadata(
        "again <ref prompt=\"self\" />",
        &MetadataOptions::new().resolver(resolver).path("self"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::CircularReference);
}

#[tokio::test]
async fn test_error_in_child_points_into_child() {
    let resolver = MapResolver::new().with_prompt("child", "line\n<foo>x</foo>");
    let err = read_metadata("<ref prompt=\"child\" />", &MetadataOptions::new().resolver(resolver))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownTag);
    assert_eq!(err.line_column(), Some((2, 1)));
    assert_eq!(err.prompt_path.as_deref(), Some("child"));

    let resolver = MapResolver::new()
        .with_prompt("middle", "<ref prompt=\"leaf\" />")
        .with_prompt("leaf", "{{ if }}");
    let err = read_metadata("<ref prompt=\"middle\" />", &MetadataOptions::new().resolver(resolver))
        .await
        .unwrap_err();
    assert_eq!(err.prompt_path.as_deref(), Some("leaf"));

    let err = read_metadata("<foo />", &MetadataOptions::new().resolver(MapResolver::new()))
        .await
        .unwrap_err();
    assert_eq!(err.prompt_path, None);
}

struct FailingResolver;

#[async_trait::async_trait]
impl ReferenceResolver for FailingResolver {
    async fn resolve(&self, _path: &str, _from: Option<&str>) -> Result<Option<ResolvedPrompt>, ResolveError> {
        Err(ResolveError::other("store offline"))
    }
}

#[tokio::test]
async fn test_resolver_failure() {
    let err = read_metadata("<ref prompt=\"x\" />", &MetadataOptions::new().resolver(FailingResolver))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ReferenceError);
    assert!(err.message.contains("store offline"));
}

#[tokio::test]
async fn test_schema_validation() {
    let schema = json!({
        "type": "object",
        "properties": { "model": { "type": "string" } },
        "required": ["model"]
    });

    let valid = read_metadata(
        "---\nmodel: gpt-4o\n---\nHi",
        &MetadataOptions::new().config_schema(schema.clone()),
    )
    .await
    .unwrap();
    assert_eq!(valid.schema_validation, Some(SchemaValidation::Valid));

    let invalid = read_metadata("---\nmodel: 4\n---\nHi", &MetadataOptions::new().config_schema(schema))
        .await
        .unwrap();
    let Some(SchemaValidation::Invalid(errors)) = invalid.schema_validation else {
        panic!("Expected schema errors");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, "/model");
}

#[tokio::test]
async fn test_serializes_camel_case() {
    let meta = read_metadata(
        "Hi {{ name }}",
        &MetadataOptions::new().config_schema(json!({ "type": "object" })),
    )
    .await
    .unwrap();
    let value = serde_json::to_value(&meta).unwrap();
    assert_eq!(value["parameters"], json!(["name"]));
    assert_eq!(value["referencedPrompts"], json!([]));
    assert_eq!(value["schemaValidation"], json!(true));
    assert_eq!(value["resolvedPrompt"], json!("Hi {{ name }}"));
}

/// Both passes must agree on every error that needs no parameter values.
#[tokio::test]
async fn test_error_codes_match_compile() {
    let cases = [
        ("<user><user>hi</user></user>", ErrorCode::MessageTagInsideMessage),
        ("<message>hey</message>", ErrorCode::MessageTagWithoutRole),
        ("<message role=\"robot\">hey</message>", ErrorCode::InvalidMessageRole),
        ("<tool>42</tool>", ErrorCode::ToolMessageWithoutId),
        ("<user><text><text>x</text></text></user>", ErrorCode::ContentTagInsideContent),
        ("<user><image>  </image></user>", ErrorCode::ImageTagWithoutUrl),
        (
            "<assistant><text><tool-call id=\"1\" name=\"x\" /></text></assistant>",
            ErrorCode::ToolCallTagInsideContent,
        ),
        ("<assistant><tool-call name=\"x\" /></assistant>", ErrorCode::ToolCallTagWithoutId),
        ("<assistant><tool-call id=\"1\" /></assistant>", ErrorCode::ToolCallWithoutName),
        (
            "<assistant><tool-call id=\"1\" name=\"x\">not json</tool-call></assistant>",
            ErrorCode::InvalidToolCallArguments,
        ),
        ("<user><tool-call id=\"1\" name=\"x\" /></user>", ErrorCode::InvalidToolCallPlacement),
        ("<tool-call id=\"1\" name=\"x\" />", ErrorCode::InvalidToolCallPlacement),
        ("<user><step /></user>", ErrorCode::StepTagInsideMessage),
        ("<step><step /></step>", ErrorCode::StepTagInsideStep),
        ("<step as={{ name }} />", ErrorCode::InvalidStaticAttribute),
        ("<foo>bar</foo>", ErrorCode::UnknownTag),
        ("<ref />", ErrorCode::ReferenceTagWithoutPrompt),
        ("{{ a = [1] }}{{ for a in [2] }}{{ a }}{{ endfor }}", ErrorCode::VariableAlreadyDeclared),
        ("{{ 1 instanceof 2 }}", ErrorCode::UnsupportedOperator),
    ];

    for (source, expected) in cases {
        let compiled = compile(source, Parameters::new()).expect_err(source).code;
        let analyzed = metadata_error(source, MapResolver::new()).await;
        assert_eq!((source, compiled), (source, expected));
        assert_eq!((source, analyzed), (source, expected));
    }
}

#[tokio::test]
async fn test_first_error_in_document_wins() {
    let source = "<foo>x</foo><user><tool-call id=\"1\" name=\"x\" /></user>";
    assert_eq!(metadata_error(source, MapResolver::new()).await, ErrorCode::UnknownTag);
    assert_eq!(compile(source, Parameters::new()).unwrap_err().code, ErrorCode::UnknownTag);
}
