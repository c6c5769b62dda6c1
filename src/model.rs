use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Principal,
    Admin,
    Parent,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            "principal" => Some(Self::Principal),
            "admin" => Some(Self::Admin),
            "parent" => Some(Self::Parent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Principal => "principal",
            Self::Admin => "admin",
            Self::Parent => "parent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Mcq,
    Short,
    Long,
    Numerical,
}

impl QuestionKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mcq" => Some(Self::Mcq),
            "short" => Some(Self::Short),
            "long" => Some(Self::Long),
            "numerical" => Some(Self::Numerical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mcq => "mcq",
            Self::Short => "short",
            Self::Long => "long",
            Self::Numerical => "numerical",
        }
    }

    /// mcq and numerical score by direct comparison; short and long go
    /// through rubric-guided evaluation.
    pub fn is_objective(self) -> bool {
        matches!(self, Self::Mcq | Self::Numerical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Draft,
    Published,
    Completed,
}

impl TestStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Completed => "completed",
        }
    }

    /// Forward-only: draft -> published -> completed.
    pub fn can_become(self, next: TestStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Published) | (Self::Published, Self::Completed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Evaluated,
}

impl AttemptStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "evaluated" => Some(Self::Evaluated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Evaluated => "evaluated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_are_forward_only() {
        assert!(TestStatus::Draft.can_become(TestStatus::Published));
        assert!(TestStatus::Published.can_become(TestStatus::Completed));
        assert!(!TestStatus::Draft.can_become(TestStatus::Completed));
        assert!(!TestStatus::Published.can_become(TestStatus::Draft));
        assert!(!TestStatus::Completed.can_become(TestStatus::Published));
        assert!(!TestStatus::Completed.can_become(TestStatus::Completed));
    }

    #[test]
    fn kind_objective_split() {
        assert!(QuestionKind::Mcq.is_objective());
        assert!(QuestionKind::Numerical.is_objective());
        assert!(!QuestionKind::Short.is_objective());
        assert!(!QuestionKind::Long.is_objective());
    }
}
