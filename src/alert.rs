use colored::*;

/// Shows a blocking error dialog and echoes the message to stderr.
pub fn show_error(title: &str, message: &str) {
    eprintln!("{}", format!("{}: {}", title, message).red().bold());
    let _ = rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title(title)
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}
