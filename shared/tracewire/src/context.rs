//! Identifier extraction from span attributes

use crate::span::Attributes;

const USER_ID_KEYS: [&str; 3] = ["user.id", "user_id", "userId"];
const COMPANY_ID_KEYS: [&str; 3] = ["company.id", "company_id", "companyId"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: Option<String>,
    pub company_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpContext {
    pub method: Option<String>,
    pub url: Option<String>,
}

pub fn extract_user_context(attributes: &Attributes) -> UserContext {
    UserContext {
        user_id: first_match(attributes, &USER_ID_KEYS),
        company_id: first_match(attributes, &COMPANY_ID_KEYS),
    }
}

pub fn extract_http_context(attributes: &Attributes) -> HttpContext {
    HttpContext {
        method: first_match(attributes, &["http.method"]),
        url: first_match(attributes, &["http.url"]),
    }
}

fn first_match(attributes: &Attributes, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| attributes.get(*key))
        .map(ToString::to_string)
}
