//! Chat messages sent to the generation model.

pub const SYSTEM_PROMPT: &str = "You are a helpful and knowledgeable real estate agent.";

/// Instructions for one listing. `listing_body` is passed through untouched
/// (usually the record's JSON); statements are listed one per line in
/// criterion order.
pub fn user_prompt(listing_body: &str, matched_criteria: &[String]) -> String {
    format!(
        "Write a description of the real estate listing below (\"Real Estate Listing\") \
         personalized for a buyer whose preferences are listed after it (\"Search Criteria\"). \
         The listing may be a JSON document; read it as such. \
         Keep every factual detail from the listing. \
         Never use the phrase \"search criteria\" in the description.\n\n\
         Real Estate Listing:\n{listing_body}\n\n\
         Search Criteria:\n{}\n",
        matched_criteria.join("\n")
    )
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

pub fn messages(listing_body: &str, matched_criteria: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage { role: "system", content: SYSTEM_PROMPT.to_string() },
        ChatMessage { role: "user", content: user_prompt(listing_body, matched_criteria) },
    ]
}
