use std::process::Command;

/// Convert a Command to a string that can be run in a shell (for debug
/// purposes).
///
/// It's tailored to the `ffmpeg` command, such that it pairs up groups of
/// arguments prefixed with dashes with their corresponding values (e.g. `-i`
/// and `input.mp4`), and splits them onto multiple (escaped) lines for
/// readibility.
pub fn command_to_string(cmd: &Command) -> String {
    let mut command_string = String::new();
    command_string.push_str(&cmd.get_program().to_string_lossy());

    for arg in cmd.get_args() {
        let arg_str = arg.to_string_lossy();
        command_string.push(' ');
        if arg_str.starts_with('-') && arg_str.len() > 1 {
            command_string.push_str("\\\n\t");
            command_string.push_str(&arg_str);
        } else {
            command_string.push_str(format!("{:?}", arg_str).as_str());
        }
    }

    command_string
}

/// prints as e.g. `"1:23:45.5"`
pub fn format_seconds(seconds: f64) -> String {
    let mut time_left = seconds.max(0.0);

    let hours = time_left as u64 / 3600;
    time_left -= hours as f64 * 3600.0;

    let minutes = time_left as u64 / 60;
    time_left -= minutes as f64 * 60.0;

    let seconds = time_left as u64;
    time_left -= seconds as f64;

    let milliseconds = (time_left * 1000.0).round() as u64;

    let mut string = "".to_string();
    if hours > 0 {
        string += &format!("{}:", hours);
    }
    if minutes < 10 {
        string += "0";
    }
    string += &format!("{}:", minutes);
    if seconds < 10 {
        string += "0";
    }
    string += &format!("{}", seconds);
    if milliseconds > 0 {
        string += &format!(".{:03}", milliseconds);
    }
    string
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_seconds() {
        assert_eq!(format_seconds(0.0), "00:00");
        assert_eq!(format_seconds(75.0), "01:15");
        assert_eq!(format_seconds(5025.5), "1:23:45.500");
    }

    #[test]
    fn command_string_splits_flags() {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-i", "in put.mkv", "-"]);
        assert_eq!(command_to_string(&cmd), "ffmpeg \\\n\t-i \"in put.mkv\" \"-\"");
    }
}
