//! Text rendering for structured UI payloads.
//!
//! Every structured output must carry a human-readable rendering so that a
//! text-only A2A client never receives an empty event. The renderers here
//! walk the backend's payload shapes (quick replies, buttons, lists,
//! galleries, adaptive cards) and produce a plain-text digest.
//!
//! All renderers trim whitespace from inputs; items with empty titles are
//! skipped.

use serde_json::Value;

/// Default intro sentence for a gallery when the output carries no text.
pub const GALLERY_DEFAULT_INTRO: &str = "Here are some options:";

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn trimmed_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    str_field(value, key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn items<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Render quick replies: `<label>` then one `- <title>` line per option,
/// with an image markdown suffix when the option carries an image URL.
pub fn quick_replies(payload: &Value) -> String {
    let mut lines = Vec::new();
    if let Some(label) = trimmed_field(payload, "text") {
        lines.push(label.to_string());
    }
    for reply in items(payload, "quickReplies") {
        let Some(title) = trimmed_field(reply, "title") else {
            continue;
        };
        let mut line = format!("- {}", title);
        if let Some(image) = trimmed_field(reply, "imageUrl") {
            line.push_str(&format!(" ![image]({})", image));
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Render buttons: `<label>` then one `- <title>` line per button;
/// `web_url` buttons get their URL appended.
pub fn buttons(payload: &Value) -> String {
    let mut lines = Vec::new();
    if let Some(label) = trimmed_field(payload, "text") {
        lines.push(label.to_string());
    }
    for button in items(payload, "buttons") {
        let Some(title) = trimmed_field(button, "title") else {
            continue;
        };
        let mut line = format!("- {}", title);
        if str_field(button, "type") == Some("web_url") {
            if let Some(url) = trimmed_field(button, "url") {
                line.push_str(&format!(": {}", url));
            }
        }
        lines.push(line);
    }
    lines.join("\n")
}

/// Render a list: header line, then `- <title>[: <subtitle>][ ![image](url)]`
/// per item. The header falls back to the legacy `text` field.
pub fn list(payload: &Value) -> String {
    let mut lines = Vec::new();
    let header = trimmed_field(payload, "header").or_else(|| trimmed_field(payload, "text"));
    if let Some(header) = header {
        lines.push(header.to_string());
    }
    for item in items(payload, "items") {
        if let Some(line) = card_line(item) {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Render a gallery (carousel): intro sentence, then one card line per item.
///
/// The intro is the output's own text when present, the fixed default
/// otherwise; it is emitted even when there are zero cards.
pub fn gallery(payload: &Value, output_text: Option<&str>) -> String {
    let intro = output_text
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(GALLERY_DEFAULT_INTRO);
    let mut lines = vec![intro.to_string()];
    for item in items(payload, "items") {
        if let Some(line) = card_line(item) {
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// `- <title>[: <subtitle>][ ![image](<url>)]` — shared by list and gallery.
fn card_line(item: &Value) -> Option<String> {
    let title = trimmed_field(item, "title")?;
    let mut line = format!("- {}", title);
    if let Some(subtitle) = trimmed_field(item, "subtitle") {
        line.push_str(&format!(": {}", subtitle));
    }
    if let Some(image) = trimmed_field(item, "imageUrl") {
        line.push_str(&format!(" ![image]({})", image));
    }
    Some(line)
}

/// Render an adaptive card: depth-first over the card body and its actions.
pub fn adaptive_card(payload: &Value) -> String {
    let mut lines = Vec::new();
    collect_card_elements(items(payload, "body"), &mut lines);
    collect_card_elements(items(payload, "actions"), &mut lines);
    lines.join("\n")
}

fn collect_card_elements(elements: &[Value], lines: &mut Vec<String>) {
    for element in elements {
        collect_card_element(element, lines);
    }
}

fn collect_card_element(element: &Value, lines: &mut Vec<String>) {
    let Some(element_type) = str_field(element, "type") else {
        return;
    };

    match element_type {
        "TextBlock" => {
            if let Some(text) = trimmed_field(element, "text") {
                lines.push(text.to_string());
            }
        }
        "FactSet" => {
            for fact in items(element, "facts") {
                if let (Some(title), Some(value)) =
                    (trimmed_field(fact, "title"), trimmed_field(fact, "value"))
                {
                    lines.push(format!("{}: {}", title, value));
                }
            }
        }
        "Input.Text" | "Input.Date" | "Input.Number" | "Input.Time" => {
            let label = trimmed_field(element, "label");
            let placeholder = trimmed_field(element, "placeholder");
            match (label, placeholder) {
                (Some(label), Some(placeholder)) => {
                    lines.push(format!("{} ({})", label, placeholder));
                }
                (Some(one), None) | (None, Some(one)) => lines.push(one.to_string()),
                (None, None) => {}
            }
        }
        "Input.ChoiceSet" => {
            if let Some(label) = trimmed_field(element, "label") {
                lines.push(label.to_string());
            }
            for choice in items(element, "choices") {
                if let Some(title) = trimmed_field(choice, "title") {
                    lines.push(format!("- {}", title));
                }
            }
        }
        "Input.Toggle" => {
            if let Some(title) = trimmed_field(element, "title") {
                lines.push(title.to_string());
            }
        }
        "ColumnSet" => {
            for column in items(element, "columns") {
                collect_card_elements(items(column, "items"), lines);
            }
        }
        "Container" => {
            collect_card_elements(items(element, "items"), lines);
        }
        "Action.Submit" | "Action.OpenUrl" | "Action.ShowCard" | "Action.Execute" => {
            if let Some(title) = trimmed_field(element, "title") {
                lines.push(format!("[Action: {}]", title));
            }
        }
        // Unknown element types render nothing.
        _ => {}
    }
}
