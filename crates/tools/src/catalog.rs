//! The built-in educational tool schemas.
//!
//! Registration order matters: the classifier breaks confidence ties by it.

use tutorlink_core::schema::{Derivation, ParamType, ParameterSpec, ToolSchema};

pub const NOTE_MAKER: &str = "note_maker";
pub const FLASHCARD_GENERATOR: &str = "flashcard_generator";
pub const CONCEPT_EXPLAINER: &str = "concept_explainer";
pub const QUIZ_GENERATOR: &str = "quiz_generator";

fn topic() -> ParameterSpec {
    ParameterSpec::required("topic", "The subject matter to cover", ParamType::text(1, 200))
}

fn difficulty() -> ParameterSpec {
    ParameterSpec::required(
        "difficulty",
        "How challenging the material should be",
        ParamType::one_of(&["easy", "medium", "hard"]),
    )
    .with_derivation(Derivation::DifficultyFromProfile)
}

pub fn note_maker() -> ToolSchema {
    ToolSchema::new(
        NOTE_MAKER,
        "Creates structured study notes on a topic, in outline, bullet-point, narrative or structured form",
    )
    .param(topic())
    .param(ParameterSpec::required(
        "subject",
        "The academic subject the topic belongs to",
        ParamType::text(1, 100),
    ))
    .param(
        ParameterSpec::required(
            "note_taking_style",
            "Layout of the notes",
            ParamType::one_of(&["outline", "bullet_points", "narrative", "structured"]),
        )
        .with_derivation(Derivation::NoteStyleFromLearningStyle),
    )
    .param(
        ParameterSpec::optional("include_examples", "Add worked examples", ParamType::Boolean)
            .with_derivation(Derivation::IncludeExamples),
    )
    .param(
        ParameterSpec::optional("include_analogies", "Add analogies", ParamType::Boolean)
            .with_derivation(Derivation::AnalogiesFromTeachingStyle),
    )
}

pub fn flashcard_generator() -> ToolSchema {
    ToolSchema::new(
        FLASHCARD_GENERATOR,
        "Generates question-and-answer flashcards for memorizing and practicing a topic",
    )
    .param(topic())
    .param(
        ParameterSpec::required("count", "Number of flashcards", ParamType::int_range(1, 20))
            .with_static(5),
    )
    .param(difficulty())
    .param(ParameterSpec::optional(
        "subject",
        "The academic subject the topic belongs to",
        ParamType::text(1, 100),
    ))
    .param(
        ParameterSpec::optional("include_examples", "Add examples on the cards", ParamType::Boolean)
            .with_static(true),
    )
}

pub fn concept_explainer() -> ToolSchema {
    ToolSchema::new(
        CONCEPT_EXPLAINER,
        "Explains a single concept at a chosen depth, with examples and related ideas",
    )
    .param(ParameterSpec::required(
        "concept_to_explain",
        "The concept the student asked about",
        ParamType::text(1, 200),
    ))
    .param(ParameterSpec::required(
        "current_topic",
        "The broader topic being studied",
        ParamType::text(1, 200),
    ))
    .param(
        ParameterSpec::required(
            "desired_depth",
            "How deep the explanation goes",
            ParamType::one_of(&["basic", "intermediate", "advanced", "comprehensive"]),
        )
        .with_derivation(Derivation::DepthFromProfile),
    )
}

pub fn quiz_generator() -> ToolSchema {
    ToolSchema::new(
        QUIZ_GENERATOR,
        "Builds a practice quiz or test with questions on a topic",
    )
    .param(topic())
    .param(ParameterSpec::optional(
        "subject",
        "The academic subject the topic belongs to",
        ParamType::text(1, 100),
    ))
    .param(difficulty())
    .param(
        ParameterSpec::required("question_count", "Number of questions", ParamType::int_range(1, 20))
            .with_static(5),
    )
    .param(
        ParameterSpec::optional(
            "question_types",
            "Kinds of questions to include",
            ParamType::StringList {
                allowed: Some(vec![
                    "multiple_choice".into(),
                    "true_false".into(),
                    "short_answer".into(),
                ]),
                max_items: Some(3),
            },
        )
        .with_static(tutorlink_core::ParamValue::List(vec!["multiple_choice".into()])),
    )
}

/// Every built-in schema, in registration order.
pub fn builtin_schemas() -> Vec<ToolSchema> {
    vec![
        note_maker(),
        flashcard_generator(),
        concept_explainer(),
        quiz_generator(),
    ]
}
