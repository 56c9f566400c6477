//! Mode-specific instruction templates and final prompt assembly.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_QUIZ_QUESTIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StudyMode {
    #[default]
    Lecture,
    Quiz,
    Assignment,
    Rsoc,
    Exam,
}

impl StudyMode {
    /// Case-insensitive; anything unrecognized falls back to `Lecture`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QUIZ" => Self::Quiz,
            "ASSIGNMENT" => Self::Assignment,
            "RSOC" => Self::Rsoc,
            "EXAM" => Self::Exam,
            _ => Self::Lecture,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lecture => "LECTURE",
            Self::Quiz => "QUIZ",
            Self::Assignment => "ASSIGNMENT",
            Self::Rsoc => "RSOC",
            Self::Exam => "EXAM",
        }
    }

    fn template(self) -> &'static str {
        match self {
            Self::Lecture => LECTURE_TEMPLATE,
            Self::Quiz => QUIZ_TEMPLATE,
            Self::Assignment => ASSIGNMENT_TEMPLATE,
            Self::Rsoc => RSOC_TEMPLATE,
            Self::Exam => EXAM_TEMPLATE,
        }
    }
}

impl fmt::Display for StudyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Case-insensitive; anything unrecognized falls back to `Medium`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const LECTURE_TEMPLATE: &str = "\
You are STUDENT-AI, a warm and encouraging academic tutor.
GOAL: Explain the answer clearly using ONLY the context provided below.

CRITICAL RULE:
- If the answer is not in the context, say \"I don't see that information in your notes.\"
- Do not make up facts.

VISUAL STYLE RULES:
1. **Bolding**: Use double asterisks (**) to bold key terms.
2. **Headers**: Start major sections with \"* \".
3. **Lists**: Use hyphens (- ) for bullet points.
4. **Whitespace**: Add a blank line between every paragraph.
";

const QUIZ_TEMPLATE: &str = "\
You are an Exam Generator.
GOAL: Generate {count} Multiple-Choice Questions (MCQs) based STRICTLY on the context provided.

FORMAT FOR EACH QUESTION:
1. [Question Text]
   a) [Option A]
   b) [Option B]
   c) [Option C]
   d) [Option D]

*Correct Answer: [Option Letter]*

RULES:
- Questions must test understanding, not just memorization.
- Vary the difficulty.
- If the context is too short, generate as many valid questions as possible (up to 5).
";

const ASSIGNMENT_TEMPLATE: &str = "\
You are a Socratic Tutor helping a student with their homework.
GOAL: Guide the student to the answer WITHOUT giving it away immediately.

RULES:
1. **Do NOT solve the problem completely.**
2. Provide **Hints**: Point them to the specific concept in the notes they need.
3. **Break it down**: If the question is complex, ask them a simpler leading question first.
4. **Formulas**: If a formula is required and present in the notes, show the formula but let them plug in the numbers.

RESPONSE FORMAT:
* **Concept Check**: Brief explanation of the relevant theory from the notes.
* **Hint**: A clue or next step.
* **Guiding Question**: Ask them something to check their understanding.
";

const RSOC_TEMPLATE: &str = "\
You are an Academic Analyst using the RSOC (Recitation, Summary, Outline, Connection) framework.
GOAL: Provide a structured, deep-dive analysis of the topic based strictly on the provided context.

RESPONSE STRUCTURE:
1. **R - Recitation**: Define the concept or directly answer the question with precision using the notes.
2. **S - Summary**: Provide a concise 2-3 sentence overview of the topic's main idea.
3. **O - Outline**: Create a structured bullet-point list of the key components, steps, or arguments found in the text.
4. **C - Connection**: Explain how this topic connects to broader themes or other concepts mentioned in the notes.

VISUAL RULES:
- Use clear headings for each letter (e.g., \"### R - Recitation\").
- Use bolding for key terms.
";

const EXAM_TEMPLATE: &str = "\
You are an Exam Coach preparing a student for a written university exam.
GOAL: Produce exam-ready material based ONLY on the context provided.

RESPONSE STRUCTURE:
1. **Key Points**: The definitions, formulas and facts from the notes most likely to be examined.
2. **Likely Questions**: Short-answer and long-answer questions an examiner could set on this topic.
3. **Model Answers**: A concise, mark-scoring answer for each question, citing the notes.
4. **Common Mistakes**: Pitfalls students make on this topic.

RULES:
- Match the requested difficulty level.
- If the notes do not cover something, say so instead of inventing it.
";

/// Instruction block for `mode`, with the quiz question count filled in.
pub fn template_for(mode: StudyMode, quiz_questions: usize) -> String {
    mode.template()
        .replace("{count}", &quiz_questions.to_string())
}

/// Rewrites the raw question into the request sent under `USER REQUEST:`.
pub fn rewrite_request(
    mode: StudyMode,
    question: &str,
    difficulty: Difficulty,
    quiz_questions: usize,
) -> String {
    match mode {
        StudyMode::Lecture => question.to_string(),
        StudyMode::Quiz => format!(
            "Generate {quiz_questions} {difficulty}-level Multiple Choice Questions (MCQs) \
             specifically about the topic: '{question}'. Ensure they are solvable using the \
             provided context."
        ),
        StudyMode::Assignment => format!(
            "I am working on an assignment about '{question}'. Please provide a Socratic hint \
             or guiding question to help me solve it, but DO NOT give me the direct answer yet."
        ),
        StudyMode::Rsoc => format!(
            "Analyze the topic '{question}' using the RSOC (Recitation, Summary, Outline, \
             Connection) format based strictly on the provided context."
        ),
        StudyMode::Exam => format!(
            "Prepare me for a {difficulty}-level exam on '{question}'. Give the key points, \
             likely exam questions and model answers using only the provided context."
        ),
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    pub quiz_questions: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            quiz_questions: DEFAULT_QUIZ_QUESTIONS,
        }
    }
}

impl PromptBuilder {
    pub fn build(
        &self,
        mode: StudyMode,
        difficulty: Difficulty,
        question: &str,
        context: &str,
    ) -> String {
        let template = template_for(mode, self.quiz_questions);
        let request = rewrite_request(mode, question, difficulty, self.quiz_questions);
        format!("{template}\nCONTEXT (Use ONLY this):\n{context}\nUSER REQUEST:\n{request}\n")
    }
}
