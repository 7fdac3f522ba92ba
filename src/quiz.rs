//! Quiz questions, payload validation, and the per-quiz state machine.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::QuizError;

/// Number of questions requested from the model.
pub const QUIZ_LENGTH: usize = 20;

/// Countdown budget for a full quiz (45 s per question).
pub const QUIZ_TIME_BUDGET_SECS: u32 = 900;

pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    /// Exactly [`OPTIONS_PER_QUESTION`] entries once validated.
    pub options: Vec<String>,
    pub correct_answer_index: usize,
}

impl QuizQuestion {
    fn validate(&self, index: usize) -> Result<(), QuizError> {
        let invalid = |reason: String| QuizError::InvalidQuestion { index, reason };
        if self.question.trim().is_empty() {
            return Err(invalid("empty question text".to_string()));
        }
        if self.options.len() != OPTIONS_PER_QUESTION {
            return Err(invalid(format!(
                "expected {OPTIONS_PER_QUESTION} options, got {}",
                self.options.len()
            )));
        }
        if self.correct_answer_index >= OPTIONS_PER_QUESTION {
            return Err(invalid(format!(
                "correctAnswerIndex {} out of range",
                self.correct_answer_index
            )));
        }
        Ok(())
    }
}

/// Response schema sent with the quiz request.
pub fn quiz_response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "question": { "type": "STRING" },
                "options": {
                    "type": "ARRAY",
                    "items": { "type": "STRING" },
                    "description": "Exactly 4 options"
                },
                "correctAnswerIndex": {
                    "type": "INTEGER",
                    "description": "The index (0-3) of the correct option"
                }
            },
            "required": ["question", "options", "correctAnswerIndex"]
        }
    })
}

/// Validate a structured model response into a question list.
pub fn parse_questions(value: Value) -> Result<Vec<QuizQuestion>, QuizError> {
    let questions: Vec<QuizQuestion> = serde_json::from_value(value)?;
    validate_all(&questions)?;
    Ok(questions)
}

fn validate_all(questions: &[QuizQuestion]) -> Result<(), QuizError> {
    if questions.is_empty() {
        return Err(QuizError::Empty);
    }
    questions
        .iter()
        .enumerate()
        .try_for_each(|(i, q)| q.validate(i))
}

/// Same as [`parse_questions`] for a raw JSON string.
pub fn parse_questions_str(text: &str) -> Result<Vec<QuizQuestion>, QuizError> {
    parse_questions(serde_json::from_str(text)?)
}

/// Outcome of answering the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answer {
    pub selected: usize,
    pub correct_index: usize,
    pub correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionState {
    Unanswered,
    Answered(Answer),
    Completed,
}

/// Colour band for the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
pub struct QuizSession {
    questions: Vec<QuizQuestion>,
    current_index: usize,
    selected: Option<usize>,
    score: usize,
    remaining_seconds: u32,
    timer_enabled: bool,
    completed: bool,
}

impl QuizSession {
    /// Start a quiz. `timer` is the countdown budget in seconds, `None` to
    /// run untimed. Every question must pass the same checks as
    /// [`parse_questions`].
    pub fn new(questions: Vec<QuizQuestion>, timer: Option<u32>) -> Result<Self, QuizError> {
        validate_all(&questions)?;
        Ok(QuizSession {
            questions,
            current_index: 0,
            selected: None,
            score: 0,
            remaining_seconds: timer.unwrap_or(0),
            timer_enabled: timer.is_some(),
            completed: false,
        })
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &QuizQuestion {
        &self.questions[self.current_index]
    }

    pub fn selected_option(&self) -> Option<usize> {
        self.selected
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn timer_enabled(&self) -> bool {
        self.timer_enabled
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_last_question(&self) -> bool {
        self.current_index + 1 == self.questions.len()
    }

    pub fn state(&self) -> QuestionState {
        if self.completed {
            return QuestionState::Completed;
        }
        match self.selected {
            Some(selected) => QuestionState::Answered(self.answer_for(selected)),
            None => QuestionState::Unanswered,
        }
    }

    /// Answer the current question. Only the first selection counts; later
    /// calls, out-of-range options and selections after completion return
    /// `None` and change nothing.
    pub fn select(&mut self, option: usize) -> Option<Answer> {
        if self.completed || self.selected.is_some() || option >= self.current().options.len() {
            return None;
        }
        self.selected = Some(option);
        let answer = self.answer_for(option);
        if answer.correct {
            self.score += 1;
        }
        Some(answer)
    }

    /// Move past an answered question; after the last one the quiz completes.
    pub fn advance(&mut self) -> bool {
        if self.completed || self.selected.is_none() {
            return false;
        }
        if self.is_last_question() {
            self.completed = true;
        } else {
            self.current_index += 1;
            self.selected = None;
        }
        true
    }

    /// One elapsed second. Returns `true` when this tick ran the clock out.
    pub fn tick(&mut self) -> bool {
        if !self.timer_enabled || self.completed {
            return false;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.completed = true;
            return true;
        }
        false
    }

    /// Score as a whole percentage of all questions.
    pub fn percentage(&self) -> u32 {
        (100.0 * self.score as f64 / self.questions.len() as f64).round() as u32
    }

    pub fn band(&self) -> ScoreBand {
        match self.percentage() {
            p if p >= 80 => ScoreBand::High,
            p if p >= 60 => ScoreBand::Medium,
            _ => ScoreBand::Low,
        }
    }

    /// Remaining time as `m:ss`.
    pub fn format_remaining(&self) -> String {
        format!("{}:{:02}", self.remaining_seconds / 60, self.remaining_seconds % 60)
    }

    fn answer_for(&self, selected: usize) -> Answer {
        let correct_index = self.current().correct_answer_index;
        Answer {
            selected,
            correct_index,
            correct: selected == correct_index,
        }
    }
}
