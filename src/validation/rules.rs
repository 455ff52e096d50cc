use regex::Regex;

#[derive(Clone, Debug)]
pub(crate) enum Rule {
    Required,
    MinLength(usize),
    MaxLength(usize),
    /// Must parse as a number; bounds are inclusive.
    Numeric { min: Option<f64>, max: Option<f64> },
    Pattern { regex: Regex, message: String },
}

impl Rule {
    fn check(&self, value: &str) -> Option<String> {
        match self {
            Rule::Required => value
                .trim()
                .is_empty()
                .then(|| "This field is required".to_string()),
            Rule::MinLength(n) => (value.chars().count() < *n)
                .then(|| format!("Must be at least {n} characters")),
            Rule::MaxLength(n) => (value.chars().count() > *n)
                .then(|| format!("Must be at most {n} characters")),
            Rule::Numeric { min, max } => {
                let Ok(v) = value.trim().parse::<f64>() else {
                    return Some("Must be a number".to_string());
                };
                if !v.is_finite() {
                    return Some("Must be a number".to_string());
                }
                if let Some(min) = min {
                    if v < *min {
                        return Some(format!("Must be at least {min}"));
                    }
                }
                if let Some(max) = max {
                    if v > *max {
                        return Some(format!("Must be at most {max}"));
                    }
                }
                None
            }
            Rule::Pattern { regex, message } => (!regex.is_match(value)).then(|| message.clone()),
        }
    }
}

/// A pure `value -> error message` check assembled from rules.
///
/// Rules run in insertion order and the first violation wins.
#[derive(Clone, Debug, Default)]
pub(crate) struct Validator {
    rules: Vec<Rule>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self) -> Self {
        self.rules.push(Rule::Required);
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.rules.push(Rule::MinLength(n));
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.rules.push(Rule::MaxLength(n));
        self
    }

    pub fn numeric(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.rules.push(Rule::Numeric { min, max });
        self
    }

    pub fn pattern(mut self, pattern: &str, message: impl Into<String>) -> Result<Self, regex::Error> {
        self.rules.push(Rule::Pattern {
            regex: Regex::new(pattern)?,
            message: message.into(),
        });
        Ok(self)
    }

    /// Puts a `Required` rule in front unless one is already there.
    pub fn ensure_required(mut self) -> Self {
        if !self.is_required() {
            self.rules.insert(0, Rule::Required);
        }
        self
    }

    pub fn is_required(&self) -> bool {
        self.rules.iter().any(|r| matches!(r, Rule::Required))
    }

    pub fn validate(&self, value: &str) -> Option<String> {
        self.rules.iter().find_map(|r| r.check(value))
    }
}
