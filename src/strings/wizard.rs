//! # Wizard Strings
//!
//! Messages sent to the user while a project wizard runs.

pub fn start_new(prefix: &str) -> String {
    format!(
        "**New Project Wizard**\n\n\
         Let the server know what projects you're working on! Other members can look up \
         any of your registered projects. To cancel this wizard, type `{prefix}project cancel`."
    )
}

pub fn start_edit(prefix: &str, title: &str, skip_token: &str) -> String {
    format!(
        "**Edit Project Wizard**\n\n\
         You are editing your current project, {title}. If you don't want to change a \
         previous value, type `{skip_token}` for that question. To cancel this wizard, \
         type `{prefix}project cancel`."
    )
}

pub fn end(prefix: &str) -> String {
    format!(
        "Your project is set up! Other members can now look it up and find out what \
         you're up to!\n\nTo make changes later, use `{prefix}project edit`."
    )
}

pub const CANCELLED_NEW: &str = "New project has been cancelled.";
pub const CANCELLED_EDIT: &str = "Editing your project has been cancelled.";

pub const TITLE: &str = "What is your project's title?";
pub const PITCH: &str = "Give an elevator pitch (about 50 words) for your project!";

pub fn genre(available: &str) -> String {
    format!(
        "What genre is your project? Available genres: {available}. \
         (You can specify a more specific sub-genre later.)"
    )
}

pub fn subgenre(skip_token: &str) -> String {
    format!(
        "What specific sub-genre is your project? Type `{skip_token}` if you don't want \
         to add a sub-genre."
    )
}

pub fn project_type(available: &str) -> String {
    format!("What kind of project? Available types: {available}.")
}

pub fn invalid_answer(err: &str) -> String {
    format!("❌ {err}")
}
