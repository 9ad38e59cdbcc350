use docqa_core::config::PersonaConfig;

/// Separates the system prompt, the context section and the question.
pub const DELIMITER: &str = "\n\n---\n\n";

pub const NOT_FOUND_TEXT: &str =
    "I could not find anything about that in the archive. Try rephrasing the question or adding more documents.";

pub fn build_system_prompt(persona: &PersonaConfig) -> String {
    let mut role = format!("You are {}, answering questions about a personal document archive.", persona.name);
    if let Some(description) = persona.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        role.push(' ');
        role.push_str(description);
    }
    format!(
        "{role}\n\n\
         Sources:\n\
         - Base your answer on the archive excerpts supplied with the question whenever they are relevant.\n\
         - Only fall back to general knowledge when the excerpts say nothing about the question.\n\
         - If you are unsure or the information is missing, say so plainly instead of guessing.\n\n\
         Answering:\n\
         - Keep it short: two or three sentences unless more detail is requested.\n\
         - Make sure the answer is about the person or thing actually asked about.\n\
         - When you use an excerpt, cite its source id, e.g. [Source: letters]."
    )
}

pub fn question_section(question: &str) -> String {
    format!("Question: {}", question.trim())
}

/// The user-turn prompt: context, delimiter, question. Without context it is
/// just the question section.
pub fn user_prompt(context: &str, question: &str) -> String {
    if context.trim().is_empty() {
        question_section(question)
    } else {
        format!("{context}{DELIMITER}{}", question_section(question))
    }
}

/// Size of the full prompt as the provider sees it: system prompt, delimiter,
/// user prompt.
pub fn assembled_len(system_prompt: &str, user_prompt: &str) -> usize {
    system_prompt.chars().count() + DELIMITER.chars().count() + user_prompt.chars().count()
}
