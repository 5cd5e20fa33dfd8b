//! # Help Text
//!
//! Help messages for bot commands.
//! Displayed to the user via the `.help` command.

pub fn main(prefix: &str) -> String {
    format!(
        "**🤖 Cogwheel Help**\n\
         Use: {prefix}command _args_\n\
         \n\
         **📚 Projects**\n\
         * project new: Register your project (wizard)\n\
         * project edit: Change your registered project (wizard)\n\
         * project cancel: Cancel an open wizard\n\
         * project show: Show your registered project\n\
         \n\
         While a wizard is open, every message you send is taken as the answer \
         to the current question.\n"
    )
}
