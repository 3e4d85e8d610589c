use cardforge_anki::AnkiConnect;
use cardforge_core::config::AppConfig;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

impl CheckResult {
    fn ok(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

pub async fn run_doctor(config: &AppConfig) {
    let mut checks = vec![check_api_key(config)];

    match AnkiConnect::from_config(&config.anki) {
        Ok(anki) => checks.extend(check_anki(&anki, config).await),
        Err(e) => checks.push(CheckResult::fail("AnkiConnect", e.to_string())),
    }

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_api_key(config: &AppConfig) -> CheckResult {
    let llm = &config.llm;
    let has_key = llm
        .api_key
        .as_ref()
        .is_some_and(|k| !k.is_empty() && !k.starts_with("${"));

    if has_key {
        CheckResult::ok(
            "API Key",
            format!("Configured for {} ({})", llm.model_id, llm.provider),
        )
    } else {
        CheckResult::fail(
            "API Key",
            format!("No API key set for provider '{}'", llm.provider),
        )
    }
}

/// Reachability first; deck and note type checks only make sense after it.
async fn check_anki(anki: &AnkiConnect, config: &AppConfig) -> Vec<CheckResult> {
    let version = match anki.version().await {
        Ok(v) => v,
        Err(e) => {
            return vec![CheckResult::fail(
                "AnkiConnect",
                format!("{} ({}); is Anki running?", anki.url(), e),
            )]
        }
    };
    let mut checks = vec![CheckResult::ok(
        "AnkiConnect",
        format!("{} (API version {})", anki.url(), version),
    )];

    let wanted_decks = [&config.anki.deck_name, &config.listening.deck_name];
    checks.push(match anki.deck_names().await {
        Ok(decks) => missing("Decks", &wanted_decks, &decks),
        Err(e) => CheckResult::fail("Decks", e.to_string()),
    });

    let wanted_models = [&config.anki.model_name, &config.listening.model_name];
    checks.push(match anki.model_names().await {
        Ok(models) => missing("Note types", &wanted_models, &models),
        Err(e) => CheckResult::fail("Note types", e.to_string()),
    });

    checks
}

fn missing(label: &str, wanted: &[&String], present: &[String]) -> CheckResult {
    let absent: Vec<&str> = wanted
        .iter()
        .filter(|w| !present.contains(w))
        .map(|w| w.as_str())
        .collect();
    if absent.is_empty() {
        let names: Vec<&str> = wanted.iter().map(|w| w.as_str()).collect();
        CheckResult::ok(label, names.join(", "))
    } else {
        CheckResult::fail(
            label,
            format!("missing {} (created by `cardforge serve`)", absent.join(", ")),
        )
    }
}
