use super::request::is_suspicious_path;
use super::templates::Page;

pub const LOGIN_PATH: &str = "/login";

/// What a `(method, path)` pair resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Page(Page),
    Login,
    NotFound,
    MethodNotAllowed(&'static str),
}

/// Fixed allow-list of servable paths.
pub fn page_for(path: &str) -> Option<Page> {
    match path {
        "/" | "/index" => Some(Page::Index),
        LOGIN_PATH => Some(Page::Login),
        "/success" => Some(Page::Success),
        "/error" => Some(Page::Error),
        _ => None,
    }
}

/// Value of the `Allow` header for `path`.
pub fn allowed_methods(path: &str) -> &'static str {
    if path == LOGIN_PATH {
        "GET, POST"
    } else {
        "GET"
    }
}

/// `method` is expected uppercased and `path` already stripped of query and fragment.
pub fn resolve(method: &str, path: &str) -> Route {
    if is_suspicious_path(path) {
        return Route::NotFound;
    }
    match method {
        "GET" => page_for(path).map_or(Route::NotFound, Route::Page),
        "POST" if path == LOGIN_PATH => Route::Login,
        _ => Route::MethodNotAllowed(allowed_methods(path)),
    }
}
