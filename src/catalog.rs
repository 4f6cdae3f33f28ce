//! Built-in fractions module: seven challenges that make the app usable
//! without any external configuration.

use crate::domain::{ActivityKind, Challenge, Scaffolding};

#[allow(clippy::too_many_arguments)]
fn challenge(
  id: &str,
  number: u32,
  kind: ActivityKind,
  path: &str,
  title: &str,
  duration: &str,
  pre_script: &str,
  post_question: &str,
  context_info: &str,
  correctness_filter: &str,
  ladder: [&str; 5],
) -> Challenge {
  let [probe1, probe2, hint, scaffold, reveal] = ladder;
  Challenge {
    id: id.into(),
    number,
    kind,
    path: path.into(),
    title: title.into(),
    duration: duration.into(),
    pre_script: pre_script.into(),
    post_question: post_question.into(),
    context_info: context_info.into(),
    correctness_filter: correctness_filter.into(),
    scaffolding: Scaffolding {
      probe1: probe1.into(),
      probe2: probe2.into(),
      hint: hint.into(),
      scaffold: scaffold.into(),
      reveal: reveal.into(),
    },
    max_turns: 5,
  }
}

pub fn builtin_challenges() -> Vec<Challenge> {
  vec![
    challenge(
      "video-1", 1, ActivityKind::Video,
      "/fractions-module-content/videos/video-1.mp4",
      "What are Fractions?", "2.5 min",
      "Let's start our first challenge! Watch this video about fractions.",
      "If a pizza has 4 equal slices, what do we call ONE slice? Say one-fourth or one quarter!",
      "This video teaches basic fraction concepts using pizza and cake examples. Kids learn that fractions are parts of a whole.",
      "one fourth|quarter|1/4|one-fourth|a fourth",
      [
        "Think about sharing a pizza. If you cut it into 4 equal parts and take ONE, how much is that?",
        "When we divide something into 4 parts, each part has a special name. Any guess?",
        "Four equal parts... each part is one-????",
        "It starts with 'fourth' - one-f___th!",
        "It's one-fourth! When we have 4 equal parts, each is one-fourth. Great trying!",
      ],
    ),
    challenge(
      "applet-a1", 2, ActivityKind::Applet,
      "/fractions-module-content/applets/A1. M2-Fraction Cut and Glue Practice/index.html",
      "Cut and Glue Practice", "4 min",
      "Now you'll cut paper into fractions! Use the scissors to make equal parts. Try it!",
      "In a fraction, must all pieces be the same size or different sizes?",
      "Interactive paper cutting activity. Kids practice making equal parts (halves, quarters). They use virtual scissors and glue.",
      "same|equal|same size",
      [
        "If you share a chocolate bar with your friend, would it be fair if one piece is big and one tiny?",
        "When we share equally, what must be true about each piece?",
        "For fair sharing, pieces must be the _____ size?",
        "The word rhymes with 'game' - s___e size!",
        "Same size! For fractions, all pieces must be equal - same size. Nice effort!",
      ],
    ),
    challenge(
      "applet-a2", 3, ActivityKind::Applet,
      "/fractions-module-content/applets/A2.M2-Fraction Paper Cut Snapshot/index.html",
      "Fraction Patterns", "2 min",
      "Watch how fractions change from 1/2 to 1/4 to 1/6. Pay attention!",
      "Which has MORE pieces - 1/4 or 1/6?",
      "Visual comparison of fractions 1/2, 1/4, 1/6. Correct answer: 1/6 has more pieces (6 pieces vs 4 pieces).",
      "1/6|one sixth|six|1 6",
      [
        "If you cut a cake into 4 slices vs 6 slices, which way makes more pieces?",
        "Look at the bottom numbers - 4 and 6. Which number is bigger?",
        "More cuts = more pieces. Does 1/4 or 1/6 have more cuts?",
        "6 is bigger than 4, so 1/___ has more pieces!",
        "1/6 has more pieces! 6 is more than 4. Good thinking!",
      ],
    ),
    challenge(
      "applet-a3", 4, ActivityKind::Applet,
      "/fractions-module-content/applets/A3. M2-Fraction Statement Cake Snapshot/index.html",
      "Cake Fractions", "3 min",
      "Time to learn fraction words with a cake story. Watch closely!",
      "What do we call the top number in a fraction?",
      "Cake-based vocabulary lesson. Teaches: equal parts (same size pieces), numerator (top number), denominator (bottom number).",
      "numerator",
      [
        "In 3/4, the 3 is on top. It counts how many pieces you have. What's its special name?",
        "The top number has a fancy math name. It starts with 'N'...",
        "It rhymes with 'later' and starts with 'numer'...",
        "Numer-___-tor!",
        "It's the numerator! The top number that counts your pieces. Great job trying!",
      ],
    ),
    challenge(
      "video-2", 5, ActivityKind::Video,
      "/fractions-module-content/videos/video-2.mp4",
      "Bigger Fractions", "1.9 min",
      "Now we'll make fractions like 2/4 and 3/6. The top number can be more than 1!",
      "In 2/4, the 2 tells us how many pieces we have. How many pieces is that?",
      "Advanced concept: numerators greater than 1. Examples: 2/4 (two quarters), 3/6 (three sixths).",
      "two|2|two pieces|2 pieces|2 parts|two parts",
      [
        "Look at 2/4. The top number is 2. What does that 2 tell us?",
        "If the top number is 2, how many pieces do you have?",
        "The answer is the same as the top number...",
        "It's a small number - t___!",
        "Two pieces! The 2 on top means you have 2 pieces. Well done!",
      ],
    ),
    challenge(
      "applet-a4", 6, ActivityKind::Applet,
      "/fractions-module-content/applets/A4.M2-Fraction Cut and Glue Practice 2/index.html",
      "Advanced Practice", "3 min",
      "Now make fractions with bigger top numbers. Try 2/5 or 3/5!",
      "If you colored 3 pieces out of 5, what fraction is that?",
      "Advanced cutting practice. Kids create fractions like 2/5, 3/5. They should say both numerator and denominator.",
      "3/5|three fifths|three-fifths|3 over 5|three over five",
      [
        "You colored 3 pieces. Total is 5 pieces. How do we write that?",
        "Remember: colored pieces go on TOP, total pieces go on BOTTOM. What do you get?",
        "It's 3 over 5. How do we write that as a fraction?",
        "Three over five is written as 3/_____",
        "It's 3/5! Three pieces out of five. Excellent effort!",
      ],
    ),
    challenge(
      "video-3", 7, ActivityKind::Video,
      "/fractions-module-content/videos/video-3.mp4",
      "You Did It!", "30 sec",
      "You've learned so much! Watch this final message!",
      "Quick review! What's the bottom number called?",
      "Celebration video. End of session. Kid should feel accomplished and proud.",
      "denominator",
      [
        "In 3/4, the 4 is on the bottom. It shows total pieces. What's its name?",
        "The bottom number has a name that starts with 'D'...",
        "It sounds like 'de-NOM-in-ator'...",
        "Denom-___-tor!",
        "It's the denominator! The bottom number showing total pieces. Amazing work today!",
      ],
    ),
  ]
}
