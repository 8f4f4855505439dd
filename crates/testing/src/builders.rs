//! Builders for domain test data.

use docbench_domain::{BatchSizing, RunRequest, TestCase};

/// Fluent test-case builder with sensible defaults.
pub struct TestCaseBuilder {
    case: TestCase,
}

impl TestCaseBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            case: TestCase {
                id: id.to_string(),
                category: "Basic Syntax".to_string(),
                level: 1,
                points: 10,
                task: format!("task for {id}"),
                required: Vec::new(),
                forbidden: Vec::new(),
                hints: Vec::new(),
            },
        }
    }

    pub fn category(mut self, category: &str) -> Self {
        self.case.category = category.to_string();
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.case.level = level;
        self
    }

    pub fn points(mut self, points: u32) -> Self {
        self.case.points = points;
        self
    }

    pub fn required(mut self, patterns: &[&str]) -> Self {
        self.case.required = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn forbidden(mut self, patterns: &[&str]) -> Self {
        self.case.forbidden = patterns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> TestCase {
        self.case
    }
}

/// Run-request builder over the domain defaults.
pub struct RunRequestBuilder {
    request: RunRequest,
}

impl RunRequestBuilder {
    pub fn new(model: &str, variant: &str) -> Self {
        Self {
            request: RunRequest::new(model, variant),
        }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.request.sizing = BatchSizing::Uniform { size };
        self
    }

    pub fn custom_sizes(mut self, sizes: &[usize]) -> Self {
        self.request.sizing = BatchSizing::Custom {
            sizes: sizes.to_vec(),
        };
        self
    }

    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.request.queue_size = queue_size;
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.request.temperature = temperature;
        self
    }

    pub fn test_limit(mut self, limit: usize) -> Self {
        self.request.test_limit = Some(limit);
        self
    }

    pub fn build(self) -> RunRequest {
        self.request
    }
}
