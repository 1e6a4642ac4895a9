//! The document processor
//!
//! A [`Stream`] owns everything a document needs while it is being read:
//! the target data under construction, the keyword dispatch table, the
//! variable scopes, the macro registry, and the collected diagnostics.
//! [`Stream::process`] runs the whole per-line pipeline: comment removal,
//! special-block interception, variable substitution, tokenization, and
//! handler dispatch.
//!
//! Variables, definitions, and the version window survive across
//! [`Stream::process`] calls so hosts can preseed them; per-document status
//! (errors, block stacks, highlighting) is reset on every run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::command::{Block, Handler, SpecialAction, SpecialBlock};
use crate::definition::Definition;
use crate::diagnostics::{
    DocumentStructure, FragmentId, Hyperlink, SyntaxHighlighter, SYNTAX_BLOCK, SYNTAX_COMMAND,
    SYNTAX_COMMENT, SYNTAX_OPTION, SYNTAX_VARIABLE,
};
use crate::error::Diagnostic;
use crate::lexer::{EvalContext, Function, FunctionMap};
use crate::line::Line;
use crate::trace::PositionMap;

/// File access used by `include` and `sinclude`, injectable for tests and
/// for hosts that read scripts out of archives.
pub trait FileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn exists(&self, path: &Path) -> bool;
}

/// The real filesystem.
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Hashes names for `hash(...)` expressions and file identifiers.
pub trait NameHasher {
    fn hash(&self, name: &str) -> u32;
}

/// FNV-1 over the lowercased name, the scheme game data archives use for
/// file and property identifiers.
pub struct Fnv1Hasher;

impl NameHasher for Fnv1Hasher {
    fn hash(&self, name: &str) -> u32 {
        let mut hash: u32 = 0x811C_9DC5;
        for byte in name.to_lowercase().bytes() {
            hash = hash.wrapping_mul(0x0100_0193) ^ u32::from(byte);
        }
        hash
    }
}

/// The read-only view of a stream that expression evaluation sees.
pub struct StreamContext<'a, T> {
    stream: &'a Stream<T>,
}

impl<T> EvalContext for StreamContext<'_, T> {
    fn variable(&self, name: &str) -> Option<String> {
        self.stream.get_variable(name)
    }

    fn has_definition(&self, name: &str) -> bool {
        self.stream.definitions.contains_key(name)
    }

    fn has_command(&self, name: &str) -> bool {
        self.stream.parsers.contains_key(&name.to_lowercase())
    }

    fn min_version(&self) -> i32 {
        self.stream.min_version
    }

    fn max_version(&self) -> i32 {
        self.stream.max_version
    }

    fn hash(&self, name: &str) -> Result<u32, String> {
        self.stream.file_hash(name)
    }
}

struct SplitLine {
    text: String,
    start: usize,
    end: usize,
}

/// Splits on `\r\n`, `\n` and `\r`, keeping char offsets of each line's
/// start and end within the document.
fn split_lines(text: &str) -> Vec<SplitLine> {
    let chars: Vec<char> = text.chars().collect();
    let mut lines = Vec::new();
    let mut line_start = 0;
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\n' || chars[i] == '\r' {
            lines.push(SplitLine {
                text: chars[line_start..i].iter().collect(),
                start: line_start,
                end: i,
            });
            if chars[i] == '\r' && chars.get(i + 1) == Some(&'\n') {
                i += 1;
            }
            i += 1;
            line_start = i;
        } else {
            i += 1;
        }
    }
    lines.push(SplitLine {
        text: chars[line_start..].iter().collect(),
        start: line_start,
        end: chars.len(),
    });
    lines
}

pub struct Stream<T> {
    data: T,
    on_start: Option<Rc<dyn Fn(&mut T)>>,

    folder: Option<PathBuf>,
    file_system: Box<dyn FileSystem>,
    hasher: Box<dyn NameHasher>,

    min_version: i32,
    max_version: i32,
    version: i32,

    functions: FunctionMap,
    definitions: HashMap<String, Rc<Definition>>,
    parsers: HashMap<String, Handler<T>>,
    nested_blocks: Vec<Rc<RefCell<dyn Block<T>>>>,
    special_blocks: Vec<Rc<RefCell<dyn SpecialBlock<T>>>>,

    scopes: Vec<String>,
    variables: HashMap<String, String>,
    global_variables: HashMap<String, String>,

    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,

    current_line_number: usize,
    inside_block_comment: bool,
    block_comment_line: usize,
    /// Absolute char offset where the open block comment started, kept for
    /// the highlight span emitted when it closes.
    block_comment_start: usize,
    line_positions: Vec<usize>,
    line_ends: Vec<usize>,

    syntax: SyntaxHighlighter,
    comments_syntax: SyntaxHighlighter,
    variables_syntax: SyntaxHighlighter,
    hyperlinks: Vec<Hyperlink>,
    structure: DocumentStructure,
    open_fragments: Vec<FragmentId>,
    name_factory: Option<Box<dyn Fn(usize, &str, Option<&Line>) -> String>>,

    fast_parsing: bool,
    including: bool,
}

impl<T> Stream<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            on_start: None,
            folder: None,
            file_system: Box::new(RealFileSystem),
            hasher: Box::new(Fnv1Hasher),
            min_version: 0,
            max_version: 0,
            version: 0,
            functions: FunctionMap::new(),
            definitions: HashMap::new(),
            parsers: HashMap::new(),
            nested_blocks: Vec::new(),
            special_blocks: Vec::new(),
            scopes: Vec::new(),
            variables: HashMap::new(),
            global_variables: HashMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            current_line_number: 0,
            inside_block_comment: false,
            block_comment_line: 0,
            block_comment_start: 0,
            line_positions: Vec::new(),
            line_ends: Vec::new(),
            syntax: SyntaxHighlighter::new(),
            comments_syntax: SyntaxHighlighter::new(),
            variables_syntax: SyntaxHighlighter::new(),
            hyperlinks: Vec::new(),
            structure: DocumentStructure::new(),
            open_fragments: Vec::new(),
            name_factory: None,
            fast_parsing: false,
            including: false,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    /// Sets a callback run at the start of every [`Stream::process`], before
    /// any line is read. Hosts use it to reset the target data.
    pub fn set_on_start(&mut self, on_start: impl Fn(&mut T) + 'static) {
        self.on_start = Some(Rc::new(on_start));
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn set_folder(&mut self, folder: impl Into<PathBuf>) {
        self.folder = Some(folder.into());
    }

    pub fn set_file_system(&mut self, file_system: impl FileSystem + 'static) {
        self.file_system = Box::new(file_system);
    }

    pub fn set_hasher(&mut self, hasher: impl NameHasher + 'static) {
        self.hasher = Box::new(hasher);
    }

    /// Resolves a script path against the stream's folder. Absolute paths
    /// are kept as they are.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        if Path::new(path).is_absolute() {
            return PathBuf::from(path);
        }
        match &self.folder {
            Some(folder) => folder.join(path),
            None => PathBuf::from(path),
        }
    }

    pub fn file_exists(&self, path: &Path) -> bool {
        self.file_system.exists(path)
    }

    /* -- Diagnostics -- */

    /// Adds an error, stamping it with the current line if it has none.
    pub fn add_error(&mut self, mut diagnostic: Diagnostic) {
        if diagnostic.line.is_none() {
            diagnostic.line = Some(self.current_line_number);
        }
        self.errors.push(diagnostic);
    }

    pub fn add_warning(&mut self, mut diagnostic: Diagnostic) {
        if diagnostic.line.is_none() {
            diagnostic.line = Some(self.current_line_number);
        }
        self.warnings.push(diagnostic);
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn current_line_number(&self) -> usize {
        self.current_line_number
    }

    /* -- Registration -- */

    /// Registers a handler; keywords are case-insensitive.
    pub fn add_parser(&mut self, keyword: &str, handler: Handler<T>) {
        self.parsers.insert(keyword.to_lowercase(), handler);
    }

    pub fn get_parser(&self, keyword: &str) -> Option<Handler<T>> {
        self.parsers.get(&keyword.to_lowercase()).cloned()
    }

    pub fn remove_parser(&mut self, keyword: &str) -> bool {
        self.parsers.remove(&keyword.to_lowercase()).is_some()
    }

    pub fn add_function(&mut self, name: &str, function: Rc<dyn Function>) {
        self.functions.insert(name.to_string(), function);
    }

    pub fn functions(&self) -> &FunctionMap {
        &self.functions
    }

    pub fn add_definition(&mut self, definition: Definition) {
        self.definitions
            .insert(definition.name().to_string(), Rc::new(definition));
    }

    pub fn get_definition(&self, name: &str) -> Option<Rc<Definition>> {
        self.definitions.get(name).cloned()
    }

    pub fn remove_definition(&mut self, name: &str) -> bool {
        self.definitions.remove(name).is_some()
    }

    pub fn has_definition(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /* -- Versioning -- */

    /// Sets the version window the host supports; `version` lines outside
    /// it are errors.
    pub fn set_version_range(&mut self, min: i32, max: i32) {
        self.min_version = min;
        self.max_version = max;
    }

    pub fn min_version(&self) -> i32 {
        self.min_version
    }

    pub fn max_version(&self) -> i32 {
        self.max_version
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    /* -- Variables and scopes -- */

    /// Looks a variable up, innermost scope first.
    ///
    /// A name starting with `:` only consults the host-set global table.
    /// Otherwise the name is tried qualified with every open scope prefix,
    /// longest first, then bare, then against the global table.
    pub fn get_variable(&self, name: &str) -> Option<String> {
        if let Some(global) = name.strip_prefix(':') {
            return self.global_variables.get(global).cloned();
        }
        for depth in (0..=self.scopes.len()).rev() {
            let key = qualify(&self.scopes[..depth], name);
            if let Some(value) = self.variables.get(&key) {
                return Some(value.clone());
            }
        }
        self.global_variables.get(name).cloned()
    }

    /// Sets a variable in the innermost open scope.
    pub fn set_variable(&mut self, name: &str, value: &str) {
        let key = qualify(&self.scopes, name);
        self.variables.insert(key, value.to_string());
    }

    /// Sets a variable in the global table, reachable as `$:name` from any
    /// scope.
    pub fn set_global_variable(&mut self, name: &str, value: &str) {
        self.global_variables
            .insert(name.to_string(), value.to_string());
    }

    pub fn start_scope(&mut self, scope: &str) {
        self.scopes.push(scope.to_string());
    }

    pub fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Removes every variable whose qualified name starts with `scope`.
    pub fn purge_scope(&mut self, scope: &str) {
        self.variables.retain(|key, _| !key.starts_with(scope));
    }

    /* -- Blocks -- */

    pub fn inside_block(&self) -> bool {
        !self.nested_blocks.is_empty()
    }

    /// Pops the innermost block and notifies it. Returns false when no
    /// block is open.
    pub fn end_block(&mut self) -> bool {
        match self.nested_blocks.pop() {
            Some(block) => {
                block.borrow_mut().on_block_end(self);
                true
            }
            None => false,
        }
    }

    /// Pushes a special block; it intercepts every following raw line until
    /// it reports [`SpecialAction::End`].
    pub fn start_special_block(&mut self, block: impl SpecialBlock<T> + 'static) {
        self.special_blocks.push(Rc::new(RefCell::new(block)));
    }

    /* -- Modes -- */

    /// In fast parsing mode the editor surfaces (highlighting, hyperlinks,
    /// outline, unused-option warnings) are skipped.
    pub fn set_fast_parsing(&mut self, fast_parsing: bool) {
        self.fast_parsing = fast_parsing;
    }

    pub fn is_fast_parsing(&self) -> bool {
        self.fast_parsing
    }

    pub fn is_including(&self) -> bool {
        self.including
    }

    pub fn has_syntax_highlighting(&self) -> bool {
        !self.fast_parsing && !self.including
    }

    /* -- Editor surfaces -- */

    pub fn syntax_highlighter(&self) -> &SyntaxHighlighter {
        &self.syntax
    }

    pub fn document_structure(&self) -> &DocumentStructure {
        &self.structure
    }

    pub fn hyperlinks(&self) -> &[Hyperlink] {
        &self.hyperlinks
    }

    /// Adds a highlight span given in char offsets of the current line.
    pub fn add_syntax(&mut self, start: usize, length: usize, style: &'static str) {
        if self.has_syntax_highlighting() {
            let base = self.line_position();
            self.syntax.add(base + start, length, style);
        }
    }

    /// Adds a hyperlink anchored at a char range of the current line.
    pub fn add_hyperlink(&mut self, kind: &str, value: String, start: usize, end: usize) {
        if self.has_syntax_highlighting() {
            self.hyperlinks.push(Hyperlink {
                kind: kind.to_string(),
                value,
                line: self.current_line_number,
                start,
                end,
            });
        }
    }

    /// Overrides how outline entries are described. The callback receives
    /// the nesting level, the processed line text, and the tokenized line
    /// when there is one.
    pub fn set_structure_name_factory(
        &mut self,
        factory: impl Fn(usize, &str, Option<&Line>) -> String + 'static,
    ) {
        self.name_factory = Some(Box::new(factory));
    }

    fn line_position(&self) -> usize {
        self.line_positions
            .get(self.current_line_number)
            .copied()
            .unwrap_or(0)
    }

    fn line_end(&self) -> usize {
        self.line_ends
            .get(self.current_line_number)
            .copied()
            .unwrap_or(0)
    }

    /* -- Processing -- */

    pub fn eval_context(&self) -> StreamContext<'_, T> {
        StreamContext { stream: self }
    }

    /// Hashes a name the way file identifiers are hashed: `0x` and `#`
    /// prefixes are read as hexadecimal, anything else goes through the
    /// injected hasher.
    pub fn file_hash(&self, name: &str) -> Result<u32, String> {
        let hex = name
            .strip_prefix("0x")
            .or_else(|| name.strip_prefix('#'));
        match hex {
            Some(digits) => u32::from_str_radix(digits, 16)
                .map_err(|_| format!("Invalid hexadecimal number '{name}'.")),
            None => Ok(self.hasher.hash(name)),
        }
    }

    /// Processes a whole document.
    ///
    /// Diagnostics and the editor surfaces are reset first; variables,
    /// definitions, and the version window carry over from previous runs.
    pub fn process(&mut self, text: &str) {
        let lines = split_lines(text);
        if !self.including {
            self.reset_status();
            self.line_positions = lines.iter().map(|line| line.start).collect();
            self.line_ends = lines.iter().map(|line| line.end).collect();
        }
        for line in &lines {
            self.process_line(&line.text);
            if !self.including {
                self.current_line_number += 1;
            }
        }
        // Included runs report this too, before protected parsing restores
        // the comment state; the includer surfaces it in its summary.
        if self.inside_block_comment {
            let length = lines
                .get(self.block_comment_line)
                .map_or(0, |line| line.text.chars().count());
            self.errors.push(
                Diagnostic::structural("Block comment not closed.", 0, length)
                    .with_line(self.block_comment_line),
            );
            self.inside_block_comment = false;
        }
        if self.has_syntax_highlighting() {
            let variables = std::mem::take(&mut self.variables_syntax);
            self.syntax.add_extras(&variables);
            let comments = std::mem::take(&mut self.comments_syntax);
            self.syntax.add_extras(&comments);
        }
    }

    fn reset_status(&mut self) {
        self.errors.clear();
        self.warnings.clear();
        self.hyperlinks.clear();
        self.nested_blocks.clear();
        self.special_blocks.clear();
        self.scopes.clear();
        self.current_line_number = 0;
        self.inside_block_comment = false;
        self.block_comment_line = 0;
        self.block_comment_start = 0;
        self.line_positions.clear();
        self.line_ends.clear();
        self.syntax.clear();
        self.comments_syntax.clear();
        self.variables_syntax.clear();
        self.structure = DocumentStructure::new();
        self.open_fragments.clear();
        if let Some(on_start) = self.on_start.clone() {
            on_start(&mut self.data);
        }
    }

    /// Processes one line through the whole pipeline. Returns false when
    /// the line produced an error before reaching its handler.
    pub fn process_line(&mut self, text: &str) -> bool {
        let mut comment_map = PositionMap::new();
        let stripped = match self.remove_comments(text, &mut comment_map) {
            Some(stripped) => stripped,
            None => return false,
        };
        if stripped.trim().is_empty() {
            return true;
        }

        if let Some(special) = self.special_blocks.last().cloned() {
            let chars: Vec<char> = stripped.chars().collect();
            let mut i = 0;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            let word_start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            let first_word: String = chars[word_start..i].iter().collect();

            let action = special
                .borrow_mut()
                .process_line(self, &stripped, &first_word);
            match action {
                SpecialAction::End => {
                    self.special_blocks.pop();
                    special.borrow_mut().on_block_end(self);
                    self.add_structure_end();
                    if self.has_syntax_highlighting() {
                        let start = comment_map.resolve(word_start);
                        self.add_syntax(start, i - word_start, SYNTAX_BLOCK);
                    }
                    return true;
                }
                SpecialAction::Consumed => {
                    self.add_structure(None, &stripped, false);
                    return true;
                }
                SpecialAction::PassThrough => {}
            }
        }

        let mut position_map = comment_map.clone();
        let substituted =
            match self.replace_variables_tracked(&stripped, &comment_map, Some(&mut position_map)) {
                Some(substituted) => substituted,
                None => return false,
            };

        let line = match Line::parse(&substituted, position_map) {
            Ok(line) => line,
            Err(error) => {
                self.add_error(error);
                return false;
            }
        };
        if line.is_empty() {
            return true;
        }
        let keyword = line.splits()[0].to_lowercase();

        let mut handler = None;
        for block in self.nested_blocks.iter().rev() {
            if let Some(found) = block.borrow().scope_handler(&keyword) {
                handler = Some(found);
                break;
            }
        }
        let handler = match handler.or_else(|| self.parsers.get(&keyword).cloned()) {
            Some(handler) => handler,
            None => {
                self.add_error(
                    line.create_error_for_keyword(format!("Unrecognised command '{keyword}'.")),
                );
                return false;
            }
        };

        let blocks_before = self.nested_blocks.len();
        let specials_before = self.special_blocks.len();
        match &handler {
            Handler::Command(command) => {
                let command = Rc::clone(command);
                command.parse(self, &line);
            }
            Handler::Block(block) => {
                let block = Rc::clone(block);
                block.borrow_mut().parse(self, &line);
                self.nested_blocks.push(block);
            }
        }

        // A command that pushed a special block opened one, outline-wise;
        // the line that ends it will pop the fragment.
        let mut is_block = handler.is_block() || self.special_blocks.len() > specials_before;
        if !is_block && self.nested_blocks.len() < blocks_before {
            // The command closed a block, like `end`. Its line terminates
            // the open outline fragment instead of adding one.
            is_block = true;
            self.add_structure_end();
        } else {
            self.add_structure(Some(&line), &substituted, is_block);
        }
        self.add_line_syntax(&line, is_block);
        true
    }

    /// Tokenizes one line without dispatching it: comments are stripped and
    /// variables substituted, but no handler runs. Returns `None` for blank
    /// lines and lines with errors (which are added to the stream).
    pub fn generate_line(&mut self, text: &str) -> Option<Line> {
        let mut comment_map = PositionMap::new();
        let stripped = self.remove_comments(text, &mut comment_map)?;
        if stripped.trim().is_empty() {
            return None;
        }
        let mut position_map = comment_map.clone();
        let substituted =
            self.replace_variables_tracked(&stripped, &comment_map, Some(&mut position_map))?;
        match Line::parse(&substituted, position_map) {
            Ok(line) if !line.is_empty() => Some(line),
            Ok(_) => None,
            Err(error) => {
                self.add_error(error);
                None
            }
        }
    }

    /// Runs `action` with diagnostics diverted: errors raised inside are
    /// returned instead of kept, warnings are dropped, and the including
    /// flag suppresses the editor surfaces. Used for `include` and macro
    /// instantiation, where the processed text is not part of the document.
    pub fn protected_parsing(&mut self, action: impl FnOnce(&mut Self)) -> Vec<Diagnostic> {
        let old_including = self.including;
        let old_inside_block_comment = self.inside_block_comment;
        let old_block_comment_line = self.block_comment_line;
        let old_block_comment_start = self.block_comment_start;
        let errors_len = self.errors.len();
        let warnings_len = self.warnings.len();
        self.including = true;
        self.inside_block_comment = false;

        action(self);

        self.including = old_including;
        self.inside_block_comment = old_inside_block_comment;
        self.block_comment_line = old_block_comment_line;
        self.block_comment_start = old_block_comment_start;
        self.warnings.truncate(warnings_len);
        self.errors.split_off(errors_len)
    }

    /// Reads and processes another script in protected mode, returning its
    /// errors.
    pub fn include_file(&mut self, path: &Path) -> io::Result<Vec<Diagnostic>> {
        let text = self.file_system.read_to_string(path)?;
        Ok(self.protected_parsing(|stream| stream.process(&text)))
    }

    /* -- Comment removal -- */

    /// Strips `#` line comments and `#< ... #>` block comments from one
    /// line, recording a breakpoint at every cut. Returns `None` after
    /// adding an error for a `#>` with no matching `#<`.
    fn remove_comments(&mut self, text: &str, tracker: &mut PositionMap) -> Option<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut out_len = 0;
        let mut start_index = 0;
        let mut write_end = !self.inside_block_comment;
        let mut i = 0;

        while i < chars.len() {
            if chars[i] != '#' {
                i += 1;
                continue;
            }
            match chars.get(i + 1) {
                Some('<') => {
                    if !self.inside_block_comment {
                        out.extend(&chars[start_index..i]);
                        out_len += i - start_index;
                        self.inside_block_comment = true;
                        self.block_comment_line = self.current_line_number;
                        self.block_comment_start = self.line_position() + i;
                        write_end = false;
                    }
                    i += 2;
                }
                Some('>') => {
                    if !self.inside_block_comment {
                        self.add_error(Diagnostic::structural(
                            "Missing start of block comment (#<).",
                            i,
                            i + 2,
                        ));
                        return None;
                    }
                    self.inside_block_comment = false;
                    start_index = i + 2;
                    if self.has_syntax_highlighting() {
                        let end = self.line_position() + start_index;
                        self.comments_syntax.add(
                            self.block_comment_start,
                            end - self.block_comment_start,
                            SYNTAX_COMMENT,
                        );
                    }
                    write_end = true;
                    tracker.add_entry(out_len, start_index);
                    i += 2;
                }
                _ => {
                    if self.inside_block_comment {
                        i += 1;
                        continue;
                    }
                    // A line comment; nothing after it matters.
                    out.extend(&chars[start_index..i]);
                    if self.has_syntax_highlighting() {
                        self.comments_syntax.add(
                            self.line_position() + i,
                            chars.len() - i,
                            SYNTAX_COMMENT,
                        );
                    }
                    write_end = false;
                    break;
                }
            }
        }
        if write_end {
            out.extend(&chars[start_index..]);
        }
        Some(out)
    }

    /* -- Variable substitution -- */

    /// Substitutes `$name` and `${name}` references. Returns `None` after
    /// adding an error.
    pub fn replace_variables(&mut self, text: &str) -> Option<String> {
        self.replace_variables_tracked(text, &PositionMap::new(), None)
    }

    fn replace_variables_tracked(
        &mut self,
        text: &str,
        source_map: &PositionMap,
        mut dst_map: Option<&mut PositionMap>,
    ) -> Option<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut out_len = 0;
        let mut start_index = 0;
        let mut i = 0;

        while i < chars.len() {
            if chars[i] != '$' {
                i += 1;
                continue;
            }
            out.extend(&chars[start_index..i]);
            out_len += i - start_index;
            if let Some(map) = dst_map.as_deref_mut() {
                map.add_entry(out_len, source_map.resolve(i));
            }

            let reference_start = i;
            i += 1;
            if i == chars.len() {
                self.add_error(Diagnostic::syntax(
                    "Missing variable name after '$'.",
                    source_map.resolve(reference_start),
                    source_map.resolve(i),
                ));
                return None;
            }

            let inside_braces = chars[i] == '{';
            if inside_braces {
                i += 1;
                if i == chars.len() {
                    self.add_error(Diagnostic::syntax(
                        "Missing variable name after '{'; the format should be '${variableName}'.",
                        source_map.resolve(reference_start),
                        source_map.resolve(i),
                    ));
                    return None;
                }
            }

            let name_start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == ':')
            {
                i += 1;
            }
            let name: String = chars[name_start..i].iter().collect();

            if name.is_empty() {
                self.add_error(Diagnostic::syntax(
                    "Missing variable name after '$'.",
                    source_map.resolve(reference_start),
                    source_map.resolve(i),
                ));
                return None;
            }
            if chars[name_start].is_ascii_digit() {
                self.add_error(Diagnostic::syntax(
                    format!(
                        "Invalid variable name '{name}': variable names cannot start with a numeric digit."
                    ),
                    source_map.resolve(name_start),
                    source_map.resolve(i),
                ));
                return None;
            }

            if inside_braces {
                if chars.get(i) != Some(&'}') {
                    self.add_error(Diagnostic::syntax(
                        format!("Missing closing '}}' after variable '{name}'."),
                        source_map.resolve(name_start),
                        source_map.resolve(i),
                    ));
                    return None;
                }
                i += 1;
            }

            let value = match self.get_variable(&name) {
                Some(value) => value,
                None => {
                    self.add_error(Diagnostic::semantic(
                        format!("Unknown variable '{name}'."),
                        source_map.resolve(reference_start),
                        source_map.resolve(i),
                    ));
                    return None;
                }
            };
            if self.has_syntax_highlighting() {
                let original_start = source_map.resolve(reference_start);
                let length = source_map.resolve(i) - original_start;
                self.variables_syntax.add(
                    self.line_position() + original_start,
                    length,
                    SYNTAX_VARIABLE,
                );
            }
            out.push_str(&value);
            out_len += value.chars().count();
            if let Some(map) = dst_map.as_deref_mut() {
                map.add_entry(out_len, source_map.resolve(i));
            }
            start_index = i;
        }
        out.extend(&chars[start_index..]);
        Some(out)
    }

    /* -- Outline and highlighting -- */

    fn add_structure(&mut self, line: Option<&Line>, text: &str, is_block: bool) {
        if !self.has_syntax_highlighting() {
            return;
        }
        let parent = self.open_fragments.last().copied();
        let level = parent.map_or(1, |parent| self.structure.get(parent).level + 1);
        let description = self.describe_fragment(level, text, line);
        let start = self.line_position();
        let id = self.structure.add(parent, description, start);
        if is_block {
            self.open_fragments.push(id);
        } else {
            let end = self.line_end();
            self.structure.set_end(id, end);
        }
    }

    fn add_structure_end(&mut self) {
        if !self.has_syntax_highlighting() {
            return;
        }
        if let Some(id) = self.open_fragments.pop() {
            let end = self.line_end();
            self.structure.set_end(id, end);
        }
    }

    fn describe_fragment(&self, level: usize, text: &str, line: Option<&Line>) -> String {
        if let Some(factory) = &self.name_factory {
            return factory(level, text, line);
        }
        match line {
            None => text.trim().to_string(),
            Some(line) => {
                let splits = line.splits();
                if level == 1 {
                    splits[..=line.argument_count()].join(" ")
                } else {
                    splits[0].clone()
                }
            }
        }
    }

    fn add_line_syntax(&mut self, line: &Line, is_block: bool) {
        if !self.has_syntax_highlighting() {
            return;
        }
        if line.has_keyword() {
            let (start, end) = line.split_span(0);
            let style = if is_block { SYNTAX_BLOCK } else { SYNTAX_COMMAND };
            self.add_syntax(start, end - start, style);
        }
        for (start, end) in line.option_spans() {
            self.add_syntax(start, end - start, SYNTAX_OPTION);
        }
        for warning in line.unused_option_warnings() {
            self.add_warning(warning);
        }
    }
}

fn qualify(scopes: &[String], name: &str) -> String {
    let mut key = String::new();
    for scope in scopes {
        key.push_str(scope);
        key.push(':');
    }
    key.push_str(name);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every dispatched line as its splits joined with '|'.
    fn recorder() -> Handler<Vec<String>> {
        Handler::command(|stream: &mut Stream<Vec<String>>, line: &Line| {
            let joined = line.splits().join("|");
            stream.data_mut().push(joined);
        })
    }

    fn stream() -> Stream<Vec<String>> {
        let mut stream = Stream::new(Vec::new());
        stream.add_parser("doStuff", recorder());
        stream
    }

    #[test]
    fn pipeline_tokenizes_and_dispatches() {
        let mut stream = stream();
        stream.process("doStuff first \"two words\"\n  doStuff (1, 2)  # trailing comment\n");
        assert!(stream.errors().is_empty(), "{:?}", stream.errors());
        // A leading parenthesized group is atomic but loses its parens.
        assert_eq!(stream.data(), &["doStuff|first|two words", "doStuff|1, 2"]);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let mut stream = stream();
        stream.process("DOSTUFF x");
        assert!(stream.errors().is_empty());
        assert_eq!(stream.data(), &["DOSTUFF|x"]);
    }

    #[test]
    fn unrecognised_command() {
        let mut stream = stream();
        stream.process("doStuff ok\nbogus 1\n");
        assert_eq!(stream.errors().len(), 1);
        assert_eq!(stream.errors()[0].message, "Unrecognised command 'bogus'.");
        assert_eq!(stream.errors()[0].line, Some(1));
        assert_eq!(stream.data(), &["doStuff|ok"]);
    }

    #[test]
    fn variables_substitute_into_the_line() {
        let mut stream = stream();
        stream.set_variable("color", "blue");
        stream.set_global_variable("size", "14");
        stream.process("doStuff $color ${size} $:size");
        assert!(stream.errors().is_empty(), "{:?}", stream.errors());
        assert_eq!(stream.data(), &["doStuff|blue|14|14"]);
    }

    #[test]
    fn unknown_variable_span_covers_the_reference() {
        let mut stream = stream();
        stream.process("doStuff $missing");
        assert_eq!(stream.errors().len(), 1);
        let error = &stream.errors()[0];
        assert_eq!(error.message, "Unknown variable 'missing'.");
        assert_eq!((error.start, error.end), (8, 16));
    }

    #[test]
    fn unknown_variable_span_resolves_through_comments() {
        let mut stream = stream();
        stream.process("doStuff #<c#> $missing");
        let error = &stream.errors()[0];
        assert_eq!(error.message, "Unknown variable 'missing'.");
        assert_eq!((error.start, error.end), (14, 22));
    }

    #[test]
    fn block_comment_spans_lines() {
        let mut stream = stream();
        stream.process("doStuff 1 #< skipped\nstill skipped\nalso #> doStuff 2\n");
        assert!(stream.errors().is_empty(), "{:?}", stream.errors());
        assert_eq!(stream.data(), &["doStuff|1", "doStuff|2"]);
    }

    #[test]
    fn unclosed_block_comment_reports_exactly_one_error() {
        let mut stream = stream();
        stream.process("doStuff 1\n#< open\nnever closed\nnot even here\n");
        assert_eq!(stream.data(), &["doStuff|1"]);
        assert_eq!(stream.errors().len(), 1);
        let error = &stream.errors()[0];
        assert_eq!(error.message, "Block comment not closed.");
        assert_eq!(error.line, Some(1));
    }

    #[test]
    fn stray_block_comment_end() {
        let mut stream = stream();
        stream.process("doStuff #> 1");
        assert_eq!(stream.errors().len(), 1);
        assert_eq!(
            stream.errors()[0].message,
            "Missing start of block comment (#<)."
        );
        assert_eq!((stream.errors()[0].start, stream.errors()[0].end), (8, 10));
    }

    #[test]
    fn scoped_variables_shadow_and_expire() {
        let mut stream = stream();
        stream.set_variable("x", "outer");
        stream.start_scope("terrain");
        stream.set_variable("x", "inner");
        assert_eq!(stream.get_variable("x").as_deref(), Some("inner"));
        stream.end_scope();
        assert_eq!(stream.get_variable("x").as_deref(), Some("outer"));
        // Qualified access still reaches the closed scope's variable.
        assert_eq!(stream.get_variable("terrain:x").as_deref(), Some("inner"));
    }

    #[test]
    fn purge_scope_removes_by_prefix() {
        let mut stream = stream();
        stream.start_scope("terrain");
        stream.set_variable("x", "1");
        stream.set_variable("y", "2");
        stream.end_scope();
        stream.set_variable("z", "3");
        stream.purge_scope("terrain");
        assert_eq!(stream.get_variable("terrain:x"), None);
        assert_eq!(stream.get_variable("terrain:y"), None);
        assert_eq!(stream.get_variable("z").as_deref(), Some("3"));
    }

    #[test]
    fn variables_persist_across_runs_but_errors_reset() {
        let mut stream = stream();
        stream.process("bogus");
        assert_eq!(stream.errors().len(), 1);
        stream.set_variable("kept", "yes");
        stream.process("doStuff $kept");
        assert!(stream.errors().is_empty());
        assert_eq!(stream.data(), &["doStuff|yes"]);
    }

    #[test]
    fn on_start_resets_the_data() {
        let mut stream = stream();
        stream.set_on_start(|data: &mut Vec<String>| data.clear());
        stream.process("doStuff 1");
        stream.process("doStuff 2");
        assert_eq!(stream.data(), &["doStuff|2"]);
    }

    struct ScopedBlock;

    impl Block<Vec<String>> for ScopedBlock {
        fn parse(&mut self, stream: &mut Stream<Vec<String>>, _line: &Line) {
            stream.data_mut().push("open".to_string());
        }

        fn scope_handler(&self, keyword: &str) -> Option<Handler<Vec<String>>> {
            if keyword == "inner" {
                Some(recorder())
            } else {
                None
            }
        }

        fn on_block_end(&mut self, stream: &mut Stream<Vec<String>>) {
            stream.data_mut().push("close".to_string());
        }
    }

    fn stream_with_block() -> Stream<Vec<String>> {
        let mut stream = stream();
        stream.add_parser("box", Handler::block(ScopedBlock));
        stream.add_parser(
            "end",
            Handler::command(|stream: &mut Stream<Vec<String>>, line: &Line| {
                if !stream.end_block() {
                    stream.add_error(line.create_error_for_keyword("Not inside a block."));
                }
            }),
        );
        stream
    }

    #[test]
    fn blocks_nest_and_close() {
        let mut stream = stream_with_block();
        stream.process("box a\ndoStuff 1\nend\n");
        assert!(stream.errors().is_empty(), "{:?}", stream.errors());
        assert_eq!(stream.data(), &["open", "doStuff|1", "close"]);
    }

    #[test]
    fn block_scope_handlers_take_priority_inside_the_block() {
        let mut stream = stream_with_block();
        stream.process("box a\ninner 1\nend\ninner 2\n");
        assert_eq!(stream.data(), &["open", "inner|1", "close"]);
        assert_eq!(stream.errors().len(), 1);
        assert_eq!(stream.errors()[0].message, "Unrecognised command 'inner'.");
    }

    #[test]
    fn outline_tracks_blocks() {
        let mut stream = stream_with_block();
        stream.process("box a\ndoStuff 1\nend\ndoStuff 2\n");
        let structure = stream.document_structure();
        assert_eq!(structure.roots().len(), 2);
        let block = structure.get(structure.roots()[0]);
        assert_eq!(block.description, "box a");
        assert_eq!(block.level, 1);
        assert_eq!(block.children().len(), 1);
        // The block fragment closes at the end of its `end` line.
        assert_eq!(block.end, Some(19));
        let child = structure.get(block.children()[0]);
        assert_eq!(child.description, "doStuff");
        assert_eq!(child.level, 2);
    }

    #[test]
    fn protected_parsing_diverts_diagnostics() {
        let mut stream = stream();
        stream.process("doStuff ok");
        let errors = stream.protected_parsing(|stream| {
            stream.process_line("bogus");
            stream.add_warning(Diagnostic::semantic("dropped", 0, 0));
        });
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Unrecognised command 'bogus'.");
        assert!(stream.errors().is_empty());
        assert!(stream.warnings().is_empty());
    }

    struct SwallowAll {
        seen: Vec<String>,
    }

    impl SpecialBlock<Vec<String>> for SwallowAll {
        fn process_line(
            &mut self,
            _stream: &mut Stream<Vec<String>>,
            text: &str,
            first_word: &str,
        ) -> SpecialAction {
            if first_word == "stop" {
                return SpecialAction::End;
            }
            self.seen.push(text.trim().to_string());
            SpecialAction::Consumed
        }

        fn on_block_end(&mut self, stream: &mut Stream<Vec<String>>) {
            stream.data_mut().push(format!("swallowed {}", self.seen.len()));
        }
    }

    #[test]
    fn special_blocks_intercept_raw_lines() {
        let mut stream = stream();
        stream.add_parser(
            "raw",
            Handler::command(|stream: &mut Stream<Vec<String>>, _line: &Line| {
                stream.start_special_block(SwallowAll { seen: Vec::new() });
            }),
        );
        stream.process("raw\nbogus not dispatched\n$nor substituted\nstop\ndoStuff 1\n");
        assert!(stream.errors().is_empty(), "{:?}", stream.errors());
        assert_eq!(stream.data(), &["swallowed 2", "doStuff|1"]);
    }

    #[test]
    fn generate_line_tokenizes_without_dispatch() {
        let mut stream = stream();
        stream.set_variable("v", "7");
        let line = stream.generate_line("anything $v -flag # note").unwrap();
        assert_eq!(line.splits(), ["anything", "7", "-flag"]);
        assert!(stream.data().is_empty());
        assert!(stream.generate_line("   # only a comment").is_none());
    }

    #[test]
    fn fnv1_hash_is_case_insensitive() {
        let hasher = Fnv1Hasher;
        assert_eq!(hasher.hash("Creature"), hasher.hash("creature"));
        // FNV-1 with offset basis 0x811C9DC5 over the empty string.
        assert_eq!(hasher.hash(""), 0x811C_9DC5);
    }

    #[test]
    fn file_hash_reads_hex_prefixes() {
        let stream = stream();
        assert_eq!(stream.file_hash("0x1A2B"), Ok(0x1A2B));
        assert_eq!(stream.file_hash("#FF"), Ok(0xFF));
        assert!(stream.file_hash("0xZZ").is_err());
        assert_eq!(stream.file_hash("a"), Ok(Fnv1Hasher.hash("a")));
    }

    #[test]
    fn command_reentrancy_is_allowed() {
        // A command that feeds text back through the stream must not abort
        // on its own handler registration.
        let mut stream = stream();
        stream.add_parser(
            "again",
            Handler::command(|stream: &mut Stream<Vec<String>>, line: &Line| {
                if line.argument_count() > 0 {
                    let text = format!("doStuff {}", line.splits()[1]);
                    stream.process_line(&text);
                }
            }),
        );
        stream.process("again 5");
        assert!(stream.errors().is_empty(), "{:?}", stream.errors());
        assert_eq!(stream.data(), &["doStuff|5"]);
    }
}
