use serde::Serialize;

/// The single standardized benchmark model.
pub const BENCHMARK_MODEL: &str = "llama3.1:8b";

/// Throwaway prompt used to load the model before the measured window opens.
pub const WARMUP_PROMPT: &str = "Hello, how are you?";

/// One entry of the fixed prompt catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub id: &'static str,
    pub category: &'static str,
    pub text: &'static str,
}

/// Standard catalogue, in run order. Each prompt stresses a different workload.
pub const BENCHMARK_PROMPTS: &[Prompt] = &[
    Prompt {
        id: "instruct_code",
        category: "Code Generation",
        text: "Write a Python function that implements binary search on a sorted list. Include error handling and type hints.",
    },
    Prompt {
        id: "reasoning",
        category: "Reasoning",
        text: "A farmer has 17 sheep. All but 9 run away. How many sheep does the farmer have left? Explain your reasoning step by step.",
    },
    Prompt {
        id: "creative_writing",
        category: "Creative Writing",
        text: "Write a short story in exactly 3 paragraphs about a robot discovering music for the first time.",
    },
    Prompt {
        id: "summarization",
        category: "Summarization",
        text: "Explain quantum computing to a 10-year-old in simple terms. Keep it under 100 words.",
    },
    Prompt {
        id: "instruction_following",
        category: "Instruction Following",
        text: "List the top 5 largest countries by area. For each, provide the country name, continent, and approximate area in square kilometers. Format as a numbered list.",
    },
];

pub fn benchmark_prompts() -> &'static [Prompt] {
    BENCHMARK_PROMPTS
}
