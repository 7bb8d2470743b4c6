// Cross-cutting prompt fragments shared by both backends.
// Quiz-specific instructions live in generation/prompts.rs.

/// System instruction that enforces a bare JSON array as the whole reply.
pub const JSON_ARRAY_SYSTEM: &str = "You are a precise educational assessment generator. \
    You MUST respond with a valid JSON array only. \
    Do NOT include any text before or after the JSON array. \
    Do NOT use markdown code fences. \
    Do NOT include comments, explanations or apologies outside the array.";
