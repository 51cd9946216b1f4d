//! Reply segmentation for assistant output.
//!
//! The assistant answers with narrative text interleaved with image markers
//! such as `[AI отправляет фото: ![Алиса](https://drive.google.com/file/d/ID/view)]`
//! and with scenario scaffolding (scene headers, step labels, separators).
//! [`segment`] turns such a reply into an ordered list of [`Segment`]s:
//! cleaned text spans and image references, in document order.
//!
//! Text cleaning is a single ordered table of strip rules. Rules only match
//! whole scaffolding lines or explicit markers; bracketed prose inside a
//! sentence is left alone.

use std::sync::LazyLock;

use regex::Regex;

use novel_models::Segment;

/// Phrases that introduce an image in the assistant's output.
const PHOTO_MARKER: &str = r"(?i:AI\s+отправляет\s+фото|assistant\s+sends\s+photo)";

/// A remote storage link that carries an image id.
const STORAGE_LINK: &str = r"https?://(?:drive|docs)\.google\.com/(?:file/d/[A-Za-z0-9_-]+[^\s\)\]]*|(?:open|uc)\?(?:[^\s\)\]]*&)?id=[A-Za-z0-9_-]+[^\s\)\]]*)";

/// Image markers, most specific first so that a bracketed marker wins over
/// the link inside it. Inline images and plain markdown links are consumed
/// whole so no link syntax is left in the text.
static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let inline = format!(r"!?\[[^\]\n]*\]\(\s*{STORAGE_LINK}\s*\)");
    let pattern = format!(
        r"\[[ \t]*{PHOTO_MARKER}[ \t]*:[^\[\]\n]*(?:{inline}|{STORAGE_LINK})[^\[\]\n]*\]|{PHOTO_MARKER}[ \t]*:[ \t]*(?:{inline}|{STORAGE_LINK})|{inline}|{STORAGE_LINK}"
    );
    Regex::new(&pattern).expect("Invalid image marker regex")
});

/// Extracts the storage id from a matched image marker.
static STORAGE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/file/d/([A-Za-z0-9_-]+)|[?&]id=([A-Za-z0-9_-]+)")
        .expect("Invalid storage id regex")
});

/// Scene header with a number, e.g. `**СЦЕНА 2: Бал**` or `### SCENE 3.`.
static SCENE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:#{1,6}[ \t]*|\*\*[ \t]*)*(?:СЦЕНА|SCENE)[ \t]*(\d+)")
        .expect("Invalid scene number regex")
});

/// Ordered strip rules: `(pattern, replacement)`.
///
/// Order matters. Bracket unwrapping runs before label removal so that
/// `[Описание: ...]` keeps its content; bold markers go last because several
/// header rules key on them.
const STRIP_RULES: &[(&str, &str)] = &[
    // Bracketed photo markers left without a usable link.
    (
        r"\[[ \t]*(?i:AI[ \t]+отправляет[ \t]+фото|assistant[ \t]+sends[ \t]+photo)[ \t]*:[^\[\]\n]*\]",
        "",
    ),
    // A line wrapped in brackets with a description prefix, possibly multi-line.
    (
        r"(?m)^[ \t]*\[[ \t]*(?:Описание|Description)[ \t]*:[ \t]*([^\[\]]*?)[ \t]*\][ \t]*$",
        "$1",
    ),
    // A line fully wrapped in one pair of brackets.
    (r"(?m)^[ \t]*\[[ \t]*([^\[\]\n]+?)[ \t]*\][ \t]*$", "$1"),
    // Numbered scene headers.
    (
        r"(?m)^[ \t]*(?:#{1,6}[ \t]*|\*\*[ \t]*)*(?:СЦЕНА|SCENE)[ \t]*\d+[ \t]*(?:\*\*[ \t]*)?(?:[:.][^\n]*)?$",
        "",
    ),
    // Final scene headers.
    (
        r"(?m)^[ \t]*(?:#{1,6}[ \t]*|\*\*[ \t]*)*(?:ФИНАЛЬНАЯ СЦЕНА|FINAL SCENE)[ \t]*:[^\n]*$",
        "",
    ),
    // Markdown headings announcing a scene or a transition.
    (
        r"(?m)^[ \t]*#{1,6}[ \t]*(?:СЦЕНА|SCENE|Переход к|Transition to)\b[^\n]*$",
        "",
    ),
    // Bold description labels.
    (r"\*\*(?:Описание|Description):\*\*[ \t]*\n*", ""),
    // Separators.
    (r"(?m)^[ \t]*(?:-{3,}|\*{3,}|_{3,})[ \t]*$", ""),
    // Step labels of the scenario script.
    (
        r"(?m)^[ \t]*(?:\d+\.[ \t]*)?(?:Инициализация|Цель достигнута|Initialization|Goal reached)[ \t]*:[^\n]*$",
        "",
    ),
    (r"(?m)^[ \t]*(?:Шаг|Step)[ \t]+\d+\.[^\n]*$", ""),
    (r"(?m)^[ \t]*Теперь мы готовы начать![^\n]*$", ""),
    // Leading list numbers before a capitalized item.
    (r"(?m)^([ \t]*)\d+\.[ \t]+(\p{Lu})", "$1$2"),
    // Photo marker openers whose bracket never closes on the line.
    (
        r"\[?[ \t]*(?i:AI[ \t]+отправляет[ \t]+фото|assistant[ \t]+sends[ \t]+photo)[ \t]*:[ \t]*",
        "",
    ),
    // Heading hashes on remaining headings; the heading text stays.
    (r"(?m)^[ \t]*#{1,6}[ \t]+", ""),
    // Bold markers.
    (r"\*\*", ""),
];

/// A compiled strip rule.
struct StripRule {
    pattern: Regex,
    replacement: &'static str,
}

static RULES: LazyLock<Vec<StripRule>> = LazyLock::new(|| {
    STRIP_RULES
        .iter()
        .map(|&(pattern, replacement)| StripRule {
            pattern: Regex::new(pattern).expect("Invalid strip rule regex"),
            replacement,
        })
        .collect()
});

static HORIZONTAL_WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\f\v]+").expect("Invalid whitespace regex"));

static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("Invalid blank line regex"));

/// Split a raw assistant reply into ordered text and image segments.
///
/// Never returns an empty list: if nothing survives cleaning, the original
/// input is returned unmodified as a single text segment.
pub fn segment(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for marker in IMAGE_RE.find_iter(raw) {
        let Some(reference) = storage_id(marker.as_str()) else {
            continue;
        };
        push_text(&mut segments, &raw[cursor..marker.start()]);
        segments.push(Segment::Image(reference));
        cursor = marker.end();
    }
    push_text(&mut segments, &raw[cursor..]);

    if segments.is_empty() {
        segments.push(Segment::Text(raw.to_string()));
    }
    segments
}

/// Highest scene number announced by a scene header in the reply.
pub fn scene_number(raw: &str) -> Option<u32> {
    SCENE_NUMBER_RE
        .captures_iter(raw)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .max()
}

/// The text segments joined by newlines; images are dropped.
///
/// This is what gets persisted as the assistant's message.
pub fn plain_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .filter_map(Segment::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip scaffolding from one text span and normalize whitespace.
pub fn clean_text(text: &str) -> String {
    let mut cleaned = text.replace("\r\n", "\n");
    for rule in RULES.iter() {
        cleaned = rule
            .pattern
            .replace_all(&cleaned, rule.replacement)
            .into_owned();
    }

    let lines: Vec<String> = cleaned
        .lines()
        .map(|line| HORIZONTAL_WS_RE.replace_all(line, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");
    BLANK_LINES_RE
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

fn push_text(segments: &mut Vec<Segment>, span: &str) {
    let cleaned = clean_text(span);
    if !cleaned.is_empty() {
        segments.push(Segment::Text(cleaned));
    }
}

fn storage_id(marker: &str) -> Option<String> {
    let caps = STORAGE_ID_RE.captures(marker)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(segments: &[Segment]) -> Vec<&str> {
        segments.iter().filter_map(Segment::as_text).collect()
    }

    fn images(segments: &[Segment]) -> Vec<&str> {
        segments.iter().filter_map(Segment::as_image).collect()
    }

    #[test]
    fn test_scene_header_and_inline_photo() {
        let raw = "**СЦЕНА 1: Встреча**\nПривет! [AI отправляет фото: ![cat](https://drive.google.com/file/d/XYZ123/view?usp=sharing)] Как дела?";
        assert_eq!(
            segment(raw),
            vec![
                Segment::text("Привет!"),
                Segment::image("XYZ123"),
                Segment::text("Как дела?"),
            ]
        );
    }

    #[test]
    fn test_clean_input_is_single_trimmed_segment() {
        let inputs = [
            "  Ты стоишь у входа в старый замок.  ",
            "Первая строка.\nВторая строка.",
            "Он шепнул [почти беззвучно] своё имя.",
            "Ответ: да.",
        ];
        for input in inputs {
            assert_eq!(segment(input), vec![Segment::text(input.trim())], "{input}");
        }
    }

    #[test]
    fn test_image_order_preserved() {
        let raw = "Начало\n\
            [AI отправляет фото: ![a](https://drive.google.com/file/d/AAA/view?usp=sharing)]\n\
            Середина\n\
            https://drive.google.com/file/d/BBB/view?usp=drive_link\n\
            ![c](https://drive.google.com/open?id=CCC)\n\
            Конец";
        let segments = segment(raw);
        assert_eq!(images(&segments), vec!["AAA", "BBB", "CCC"]);
        assert_eq!(texts(&segments), vec!["Начало", "Середина", "Конец"]);
        assert_eq!(segments.first(), Some(&Segment::text("Начало")));
        assert_eq!(segments.last(), Some(&Segment::text("Конец")));
    }

    #[test]
    fn test_bracketed_link_without_inline_image() {
        let raw = "[AI отправляет фото: https://drive.google.com/file/d/Q-1_z/view?usp=drive_link]";
        assert_eq!(segment(raw), vec![Segment::image("Q-1_z")]);
    }

    #[test]
    fn test_english_marker() {
        let raw = "Look! [assistant sends photo: ![x](https://drive.google.com/uc?export=view&id=ENG42)]";
        assert_eq!(
            segment(raw),
            vec![Segment::text("Look!"), Segment::image("ENG42")]
        );
    }

    #[test]
    fn test_non_storage_markdown_image_is_text() {
        let raw = "Смотри: ![x](https://example.com/a.png)";
        assert_eq!(segment(raw), vec![Segment::text(raw)]);
    }

    #[test]
    fn test_description_wrapper_keeps_content() {
        let raw = "[Описание: Тёмный коридор, пахнет сыростью.]\nЧто будешь делать?";
        assert_eq!(
            segment(raw),
            vec![Segment::text(
                "Тёмный коридор, пахнет сыростью.\nЧто будешь делать?"
            )]
        );
    }

    #[test]
    fn test_multiline_description_wrapper() {
        let raw = "[Описание: Ночь.\nЛуна светит в окно.]";
        assert_eq!(segment(raw), vec![Segment::text("Ночь.\nЛуна светит в окно.")]);
    }

    #[test]
    fn test_fully_bracketed_line_unwrapped() {
        let raw = "[Вы слышите шаги за дверью]";
        assert_eq!(segment(raw), vec![Segment::text("Вы слышите шаги за дверью")]);
    }

    #[test]
    fn test_scaffolding_removed() {
        let raw = "### СЦЕНА 2\n\
            Шаг 3. Представь персонажей\n\
            Инициализация: спроси имя\n\
            ---\n\
            **Описание:**\n\
            Ветер гонит листья по площади.\n\n\n\n\
            Цель достигнута: знакомство\n\
            Теперь мы готовы начать! Поехали\n\
            ### Переход к следующей сцене\n\
            **Алиса** улыбается.";
        assert_eq!(
            segment(raw),
            vec![Segment::text(
                "Ветер гонит листья по площади.\n\nАлиса улыбается."
            )]
        );
    }

    #[test]
    fn test_final_scene_header() {
        let raw = "### ФИНАЛЬНАЯ СЦЕНА: Рассвет\nВсё закончилось.";
        assert_eq!(segment(raw), vec![Segment::text("Всё закончилось.")]);
    }

    #[test]
    fn test_list_numbers_stripped_before_capitals() {
        let raw = "Выбери:\n1. Открыть дверь\n2. Уйти";
        assert_eq!(segment(raw), vec![Segment::text("Выбери:\nОткрыть дверь\nУйти")]);

        let raw = "Было 3. и ещё\n10. потом";
        assert_eq!(segment(raw), vec![Segment::text(raw)]);
    }

    #[test]
    fn test_markdown_link_to_storage_is_image() {
        let raw = "Смотри [портрет](https://drive.google.com/file/d/PIC/view?usp=sharing) героя.";
        assert_eq!(
            segment(raw),
            vec![
                Segment::text("Смотри"),
                Segment::image("PIC"),
                Segment::text("героя."),
            ]
        );
    }

    #[test]
    fn test_bold_scene_header_without_title() {
        assert_eq!(segment("**СЦЕНА 2**\nТекст"), vec![Segment::text("Текст")]);
        assert_eq!(segment("SCENE 3\nText"), vec![Segment::text("Text")]);
        assert_eq!(scene_number("**СЦЕНА 2**\nТекст"), Some(2));
    }

    #[test]
    fn test_photo_marker_without_link_removed() {
        let raw = "Первое. [AI отправляет фото: нет ссылки] Второе.";
        assert_eq!(segment(raw), vec![Segment::text("Первое. Второе.")]);

        let raw = "[AI отправляет фото: нет ссылки]\nДальше";
        assert_eq!(segment(raw), vec![Segment::text("Дальше")]);
    }

    #[test]
    fn test_whitespace_collapsed() {
        let raw = "Слово   \t другое\n\n\n\nЕщё";
        assert_eq!(segment(raw), vec![Segment::text("Слово другое\n\nЕщё")]);
    }

    #[test]
    fn test_fully_stripped_input_returns_original() {
        let raw = "**СЦЕНА 3: Пусто**\n---";
        assert_eq!(segment(raw), vec![Segment::text(raw)]);
        assert_eq!(segment(""), vec![Segment::text("")]);
        assert_eq!(segment("   \n "), vec![Segment::text("   \n ")]);
    }

    #[test]
    fn test_only_image() {
        let raw = "![a](https://drive.google.com/file/d/ONLY/view)";
        assert_eq!(segment(raw), vec![Segment::image("ONLY")]);
    }

    #[test]
    fn test_non_loss_of_words() {
        let raw = "**СЦЕНА 4: Лес**\n[Описание: Старый дуб у реки.]\n\
            Мария находит [AI отправляет фото: ![ключ](https://drive.google.com/file/d/K/view)] \
            золотой ключ и **серебряный** компас.";
        let segments = segment(raw);
        let output = plain_text(&segments);
        for word in output.split_whitespace() {
            assert!(raw.contains(word), "introduced word {word:?}");
        }
        for phrase in ["Старый дуб у реки.", "Мария находит", "золотой ключ", "серебряный", "компас"] {
            assert!(output.contains(phrase), "lost phrase {phrase:?}");
        }
        assert_eq!(images(&segments), vec!["K"]);
    }

    #[test]
    fn test_scene_number() {
        assert_eq!(scene_number("**СЦЕНА 1: А**\nтекст\n### СЦЕНА 3. Б"), Some(3));
        assert_eq!(scene_number("SCENE 12: Harbor"), Some(12));
        assert_eq!(scene_number("В сцене 5 ничего нет"), None);
    }

    #[test]
    fn test_plain_text_skips_images() {
        let segments = vec![
            Segment::text("a"),
            Segment::image("X"),
            Segment::text("b"),
        ];
        assert_eq!(plain_text(&segments), "a\nb");
    }
}
