use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Page-scoped values describing the page being rendered.
///
/// Hooks fill in whatever the host supplies; everything except `is_survey`
/// is optional because not every page has a record or a form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageContext {
    pub pid: Option<i64>,
    pub record: Option<String>,
    pub form: Option<String>,
    pub event_id: Option<i64>,
    pub instance: Option<i64>,
    pub dag_id: Option<i64>,
    #[serde(default)]
    pub is_survey: bool,
    /// Host page path, e.g. `DataEntry/record_home.php`.
    pub page: Option<String>,
    pub arm: Option<String>,
    /// Raw request (query string) parameters of the current page.
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl PageContext {
    pub fn for_project(pid: Option<i64>) -> Self {
        Self {
            pid,
            ..Default::default()
        }
    }

    pub fn with_record(mut self, record: impl Into<String>) -> Self {
        self.record = Some(record.into());
        self
    }

    pub fn with_form(mut self, form: impl Into<String>) -> Self {
        self.form = Some(form.into());
        self
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn survey(mut self) -> Self {
        self.is_survey = true;
        self
    }

    /// Look up a request parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The current survey page number (`__page__`), defaulting to 1.
    pub fn survey_page(&self) -> u32 {
        self.param("__page__")
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survey_page_defaults_to_first() {
        let ctx = PageContext::for_project(Some(3)).survey();
        assert_eq!(ctx.survey_page(), 1);

        let ctx = ctx.with_param("__page__", "0");
        assert_eq!(ctx.survey_page(), 1);
    }

    #[test]
    fn survey_page_reads_request_parameter() {
        let ctx = PageContext::for_project(Some(3)).with_param("__page__", "4");
        assert_eq!(ctx.survey_page(), 4);
    }
}
