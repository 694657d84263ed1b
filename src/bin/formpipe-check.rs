use formpipe::{AttributeSet, Form, FormConfig, FormError, StaticSource, TagSettings};
use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::fs;
use std::process;

/// A fixture: form configuration, an optional submission, and the fields
/// to render afterwards.
#[derive(Debug, Deserialize)]
struct Fixture {
    form: FormConfig,
    #[serde(default)]
    submission: Option<Value>,
    #[serde(default)]
    fields: Vec<FieldFixture>,
}

#[derive(Debug, Deserialize)]
struct FieldFixture {
    field: String,
    #[serde(rename = "type", default = "default_type")]
    type_name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    attributes: AttributeSet,
    #[serde(default)]
    options: Option<Value>,
    #[serde(default)]
    inner: Option<String>,
}

fn default_type() -> String {
    "text".to_string()
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: formpipe-check <fixture.yaml>...");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  formpipe-check signup.yaml");
        eprintln!("  formpipe-check fixtures/*.yaml");
        process::exit(1);
    }

    let mut exit_code = 0;

    for file_path in &args[1..] {
        match check_file(file_path) {
            Ok(valid) => {
                if valid {
                    println!("✓ {} is valid", file_path);
                } else {
                    println!("✗ {} failed validation", file_path);
                    exit_code = 1;
                }
            }
            Err(e) => {
                eprintln!("✗ {} has errors:", file_path);
                print_error(&e);
                exit_code = 1;
            }
        }
    }

    process::exit(exit_code);
}

fn check_file(path: &str) -> Result<bool, FormError> {
    let content = fs::read_to_string(path)
        .map_err(|e| FormError::ConfigError(format!("Failed to read file: {}", e)))?;
    let fixture: Fixture = serde_yaml::from_str(&content)?;

    let mut form = Form::new(fixture.form)?;
    let submitted = fixture.submission.is_some();
    if let Some(submission) = fixture.submission {
        let source = StaticSource::new().with_submission(form.method(), form.id(), submission);
        form.fetch(&source);
    }

    let valid = if submitted { form.validate() } else { true };

    println!("{}", form.open(&AttributeSet::new()));
    for field in &fixture.fields {
        if let Some(label) = &field.label {
            println!("{}", form.label(&field.field, label));
        }
        let mut settings = TagSettings::new().attributes(field.attributes.clone());
        if let Some(options) = &field.options {
            settings = settings.options(options.clone());
        }
        if let Some(inner) = &field.inner {
            settings = settings.inner(inner.as_str());
        }
        println!("{}", form.field(&field.field, &field.type_name, &settings));
        let error = form.error(&field.field);
        if !error.is_empty() {
            println!("{}", error);
        }
    }
    println!("{}", form.close());

    for (field, messages) in form.errors() {
        for message in messages {
            eprintln!("  {}: {}", field, message);
        }
    }
    Ok(valid)
}

fn print_error(error: &FormError) {
    match error {
        FormError::InvalidMethod { method } => {
            eprintln!("  Invalid submit method '{}':", method);
            eprintln!("    Expected one of: POST, GET");
        }
        FormError::InvalidFieldPath { path, reason } => {
            eprintln!("  Invalid field path '{}':", path);
            eprintln!("    {}", reason);
        }
        FormError::InvalidFieldWrapper(msg) => {
            eprintln!("  Invalid field wrapper:");
            eprintln!("    {}", msg);
        }
        FormError::InvalidRule { field, reason } => {
            eprintln!("  Invalid rule for field '{}':", field);
            eprintln!("    {}", reason);
        }
        FormError::ConfigError(msg) => {
            eprintln!("  Configuration error:");
            eprintln!("    {}", msg);
        }
        FormError::DeserializationError(msg) => {
            eprintln!("  Deserialization error:");
            eprintln!("    {}", msg);
        }
    }
}
