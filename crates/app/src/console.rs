use diabetes_rag_core::{
    Answer, BuildEvent, BuildObserver, Citation, CorpusInspection, DocumentStats,
    TracingObserver,
};

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

/// Prints the statistics a user cares about and forwards everything to tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleObserver {
    tracing: TracingObserver,
}

impl BuildObserver for ConsoleObserver {
    fn on_event(&self, event: &BuildEvent) {
        self.tracing.on_event(event);
        match event {
            BuildEvent::NoIndexPresent { location } => {
                println!("no index in {}, building from documents", location.display());
            }
            BuildEvent::DocumentsLoaded { count, skipped } => {
                println!("{count} document(s) loaded, {skipped} skipped");
            }
            BuildEvent::DocumentSkipped { path, reason } => {
                println!("  skipped {}: {reason}", path.display());
            }
            BuildEvent::Cleaned {
                before,
                after,
                character_reduction,
                word_reduction,
            } => {
                print_stats("before cleaning", before);
                print_stats("after cleaning", after);
                println!("reduction: characters {character_reduction:.1}%, words {word_reduction:.1}%");
            }
            BuildEvent::Chunked { documents, chunks } => {
                println!("{chunks} chunk(s) from {documents} document(s)");
            }
            BuildEvent::RebuildingAfterMismatch { stored, configured } => {
                println!("embedding model changed ({stored} -> {configured}), rebuilding index");
            }
            _ => {}
        }
    }
}

pub fn print_stats(title: &str, stats: &DocumentStats) {
    println!("{title}");
    println!("{THIN_RULE}");
    println!("  num_documents: {}", stats.num_documents);
    println!("  total_characters: {}", stats.total_characters);
    println!("  total_words: {}", stats.total_words);
    println!("  avg_chars_per_document: {:.2}", stats.avg_chars_per_document);
    println!("  avg_words_per_document: {:.2}", stats.avg_words_per_document);
}

pub fn print_citations(citations: &[Citation]) {
    if citations.is_empty() {
        println!("no matching passages");
        return;
    }
    for citation in citations {
        println!(
            "[{}] score={:.4} source={}",
            citation.rank, citation.score, citation.source_name
        );
        println!("  {}", citation.source_excerpt.replace('\n', "\n  "));
    }
}

pub fn print_answer(answer: &Answer) {
    println!("\n--- answer ---");
    match &answer.synthesis {
        Ok(text) => println!("{text}"),
        Err(error) => println!("answer unavailable: {error}"),
    }
    println!("--- sources ---");
    print_citations(&answer.citations());
    println!("---------------");
}

pub fn print_inspection(report: &CorpusInspection, preview: bool) {
    println!("{RULE}");
    print_stats("statistics before cleaning", &report.before);
    println!();
    print_stats("statistics after cleaning", &report.after);
    println!();
    println!("reduction");
    println!("{THIN_RULE}");
    println!("  characters: {:.1}%", report.character_reduction);
    println!("  words: {:.1}%", report.word_reduction);

    if preview {
        let total = report.previews.len();
        for (position, document) in report.previews.iter().enumerate() {
            println!("\n{RULE}");
            println!("document {}/{total}: {}", position + 1, document.file_name);
            println!("--- original ({} characters, {} words) ---", document.original_chars, document.original_words);
            println!("{}", document.original);
            println!("--- cleaned ({} characters, {} words) ---", document.cleaned_chars, document.cleaned_words);
            println!("{}", document.cleaned);
        }
    }

    println!("\npotential problems");
    println!("{RULE}");
    if report.problems.is_empty() {
        println!("  no major problem found");
    }
    for problem in &report.problems {
        println!("  ! {problem}");
    }

    println!("\nrecommendations");
    println!("{RULE}");
    if report.recommendations.is_empty() {
        println!("  documents look clean");
    }
    for (position, recommendation) in report.recommendations.iter().enumerate() {
        println!("  {}. {recommendation}", position + 1);
    }
}
