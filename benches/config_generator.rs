//! Generates synthetic service configs of specified line counts for benchmarking

pub fn generate_config(target_lines: usize) -> String {
    let mut output = String::with_capacity(target_lines * 40);

    // Header with declared directives
    output.push_str("# Synthetic benchmark config\n");
    output.push_str("PIDFile /run/bench.pid\n");
    output.push_str("LoadPlugin cpu\n");
    output.push_str("LoadPlugin memory\n");
    output.push('\n');

    let mut lines = 5;
    let mut section_num = 0;

    while lines + 2 < target_lines {
        // A section every ~25 lines
        output.push_str(&format!("<Directory \"/srv/site{}\">\n", section_num));
        lines += 1;

        let entries = (target_lines - lines - 1).clamp(1, 22);
        for i in 0..entries {
            let id = section_num * 25 + i;
            match i % 5 {
                0 => output.push_str(&format!("  # setting group {}\n", id)),
                1 => output.push_str(&format!("  Option{} value_{}\n", id, id)),
                2 => output.push_str(&format!("  Limit{} {} # inline note\n", id, id * 10)),
                3 => output.push_str(&format!("  #Disabled{} off\n", id)),
                4 => output.push_str(&format!("  Path{} /var/lib/site{}/{}\n", id, section_num, i)),
                _ => unreachable!(),
            }
            lines += 1;
        }

        output.push_str("</Directory>\n");
        lines += 1;
        section_num += 1;

        // Blank line between sections
        if lines + 2 < target_lines {
            output.push('\n');
            lines += 1;
        }
    }

    output.push_str("# end of file\n");

    output
}

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use super::generate_config;

    #[test]
    fn test_generate_small() {
        let config = generate_config(50);
        let lines = config.lines().count();
        assert!((48..=52).contains(&lines), "Got {} lines", lines);
    }

    #[test]
    fn test_generate_large() {
        let config = generate_config(1000);
        let lines = config.lines().count();
        assert!((998..=1002).contains(&lines), "Got {} lines", lines);
    }

    #[test]
    fn test_sections_closed() {
        let config = generate_config(100);
        assert_eq!(
            config.matches("<Directory").count(),
            config.matches("</Directory>").count()
        );
    }
}
