use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beginner => write!(f, "beginner"),
            Self::Intermediate => write!(f, "intermediate"),
            Self::Advanced => write!(f, "advanced"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    id: String,
    title: String,
    description: String,
    difficulty: Difficulty,
    #[serde(default)]
    concepts: Vec<String>,
    /// Minutes.
    duration: u32,
    points: u32,
    #[serde(default)]
    prerequisites: Vec<String>,
    #[serde(default)]
    sections: Vec<LessonSection>,
    quiz: Option<Quiz>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonSection {
    pub id: String,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct_answer: usize,
    pub explanation: String,
}

impl Question {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        options: Vec<String>,
        correct_answer: usize,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            options,
            correct_answer,
            explanation: String::new(),
        }
    }

    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct_answer
    }
}

impl Lesson {
    pub fn new(id: impl Into<String>, title: impl Into<String>, points: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            difficulty: Difficulty::Beginner,
            concepts: Vec::new(),
            duration: 0,
            points,
            prerequisites: Vec::new(),
            sections: Vec::new(),
            quiz: None,
        }
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_quiz(mut self, questions: Vec<Question>) -> Self {
        self.quiz = Some(Quiz {
            id: format!("{}-quiz", self.id),
            questions,
        });
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn concepts(&self) -> &[String] {
        &self.concepts
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    pub fn sections(&self) -> &[LessonSection] {
        &self.sections
    }

    pub fn quiz(&self) -> Option<&Quiz> {
        self.quiz.as_ref()
    }

    /// Prerequisites not present in `completed`.
    pub fn missing_prerequisites<'a>(&'a self, completed: &[String]) -> Vec<&'a str> {
        self.prerequisites
            .iter()
            .filter(|p| !completed.contains(p))
            .map(String::as_str)
            .collect()
    }
}
