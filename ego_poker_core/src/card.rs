use itertools::Itertools;
use rand::Rng;
use rand::prelude::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// --- 核心数据结构定义 ---

/// 花色 (Suit)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Suit {
    Spade,   // 黑桃 ♠
    Heart,   // 红心 ♥
    Diamond, // 方块 ♦
    Club,    // 梅花 ♣
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spade, Suit::Heart, Suit::Diamond, Suit::Club];
}

/// 点数 (Rank)
/// Ace 可以是最大也可以是最小 (在 A-2-3-4-5 顺子中)
/// Ord 的派生让 Ace 默认是最大的
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six, Rank::Seven,
        Rank::Eight, Rank::Nine, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King, Rank::Ace,
    ];

    /// 英文名称，用于牌型描述 ("Flush, Ace high")
    pub fn name(self) -> &'static str {
        match self {
            Rank::Two => "Two",
            Rank::Three => "Three",
            Rank::Four => "Four",
            Rank::Five => "Five",
            Rank::Six => "Six",
            Rank::Seven => "Seven",
            Rank::Eight => "Eight",
            Rank::Nine => "Nine",
            Rank::Ten => "Ten",
            Rank::Jack => "Jack",
            Rank::Queen => "Queen",
            Rank::King => "King",
            Rank::Ace => "Ace",
        }
    }

    /// 复数形式 ("Pair of Sixes")
    pub fn plural(self) -> String {
        match self {
            Rank::Six => "Sixes".to_string(),
            other => format!("{}s", other.name()),
        }
    }
}

/// 单张扑克牌 (Card)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Card {
        Card { rank, suit }
    }
}

/// 牌型等级 (HandRank)
/// 1. 变体按从小到大的顺序排列，可以直接利用 `Ord` 进行比较。
/// 2. 变体内部存储了比较所需的所有信息（对子的大小、三条的大小、踢脚牌等）。
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Serialize, Deserialize)]
pub enum HandRank {
    HighCard(Rank, Rank, Rank, Rank, Rank),          // 高牌
    OnePair(Rank, Rank, Rank, Rank),                 // 一对
    TwoPair(Rank, Rank, Rank),                       // 两对
    ThreeOfAKind(Rank, Rank, Rank),                  // 三条
    Straight(Rank),                                  // 顺子 (最高牌的点数)
    Flush(Rank, Rank, Rank, Rank, Rank),             // 同花
    FullHouse(Rank, Rank),                           // 葫芦 (三条的点数, 对子的点数)
    FourOfAKind(Rank, Rank),                         // 四条 (四条的点数, 踢脚牌)
    StraightFlush(Rank),                             // 同花顺 (最高牌的点数)
    RoyalFlush,                                      // 皇家同花顺
}

// --- 文本表示 ---

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Suit::Spade => "♠",
            Suit::Heart => "♥",
            Suit::Diamond => "♦",
            Suit::Club => "♣",
        })
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "T",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

/// 作为 winReason 写入会话，例如 "Flush, Ace high"
impl fmt::Display for HandRank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HandRank::HighCard(r, ..) => write!(f, "High Card, {} high", r.name()),
            HandRank::OnePair(r, ..) => write!(f, "Pair of {}", r.plural()),
            HandRank::TwoPair(hi, lo, _) => write!(f, "Two Pair, {} and {}", hi.plural(), lo.plural()),
            HandRank::ThreeOfAKind(r, ..) => write!(f, "Three of a Kind, {}", r.plural()),
            HandRank::Straight(r) => write!(f, "Straight, {} high", r.name()),
            HandRank::Flush(r, ..) => write!(f, "Flush, {} high", r.name()),
            HandRank::FullHouse(three, two) => write!(f, "Full House, {} over {}", three.plural(), two.plural()),
            HandRank::FourOfAKind(r, _) => write!(f, "Four of a Kind, {}", r.plural()),
            HandRank::StraightFlush(r) => write!(f, "Straight Flush, {} high", r.name()),
            HandRank::RoyalFlush => write!(f, "Royal Flush"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCardError {
    #[error("牌面必须是两个字符，例如 \"AS\"，收到 {0:?}")]
    BadLength(String),
    #[error("无法识别的点数 {0:?}")]
    BadRank(char),
    #[error("无法识别的花色 {0:?}")]
    BadSuit(char),
}

/// 两字符记法：点数 + 花色，如 "AS"、"td"、"9♥"
impl FromStr for Card {
    type Err = ParseCardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        let (Some(r), Some(su), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(ParseCardError::BadLength(s.to_string()));
        };
        let rank = match r.to_ascii_uppercase() {
            '2' => Rank::Two,
            '3' => Rank::Three,
            '4' => Rank::Four,
            '5' => Rank::Five,
            '6' => Rank::Six,
            '7' => Rank::Seven,
            '8' => Rank::Eight,
            '9' => Rank::Nine,
            'T' => Rank::Ten,
            'J' => Rank::Jack,
            'Q' => Rank::Queen,
            'K' => Rank::King,
            'A' => Rank::Ace,
            other => return Err(ParseCardError::BadRank(other)),
        };
        let suit = match su.to_ascii_uppercase() {
            'S' | '♠' => Suit::Spade,
            'H' | '♥' => Suit::Heart,
            'D' | '♦' => Suit::Diamond,
            'C' | '♣' => Suit::Club,
            other => return Err(ParseCardError::BadSuit(other)),
        };
        Ok(Card { rank, suit })
    }
}

// --- 牌堆 ---

/// 一副牌。每局开始时新建并洗牌一次，发完即弃，不跨局复用。
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    pub const SIZE: usize = 52;

    /// 按花色、点数顺序排列的完整 52 张牌
    pub fn ordered() -> Deck {
        let cards = Suit::ALL
            .iter()
            .flat_map(|&suit| Rank::ALL.iter().map(move |&rank| Card { rank, suit }))
            .collect();
        Deck { cards }
    }

    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Deck {
        let mut deck = Deck::ordered();
        deck.cards.shuffle(rng);
        deck
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    /// 从牌堆顶部发出 n 张牌；剩余不足时返回 None 且不改变牌堆
    pub fn deal(&mut self, n: usize) -> Option<Vec<Card>> {
        if n > self.cards.len() {
            return None;
        }
        let at = self.cards.len() - n;
        Some(self.cards.split_off(at))
    }
}

// --- 牌型评估逻辑 ---

/// 从 5 到 7 张牌中找出最优的 5 张牌组合牌力。
/// 牌数不在这个范围内时返回 None。
pub fn find_best_hand(all_cards: &[Card]) -> Option<HandRank> {
    if !(5..=7).contains(&all_cards.len()) {
        return None;
    }

    // 枚举全部 5 张组合（7 张时为 21 种），贪心去牌会破坏顺子或同花
    all_cards
        .iter()
        .copied()
        .combinations(5)
        .map(|hand| evaluate_5_card_hand(&hand))
        .max()
}

/// 评估一手恰好 5 张牌的牌型
fn evaluate_5_card_hand(hand: &[Card]) -> HandRank {
    debug_assert_eq!(hand.len(), 5);

    // 从大到小排序
    let ranks: Vec<Rank> = hand.iter().map(|c| c.rank).sorted_by(|a, b| b.cmp(a)).collect();

    let is_flush = hand.iter().map(|c| c.suit).all_equal();

    let wheel = ranks == [Rank::Ace, Rank::Five, Rank::Four, Rank::Three, Rank::Two];
    let is_straight = wheel || ranks.windows(2).all(|w| w[0] as u8 == w[1] as u8 + 1);
    // A-5 顺子中，5 是最大的牌
    let high_card = if wheel { Rank::Five } else { ranks[0] };

    if is_straight && is_flush {
        return if high_card == Rank::Ace {
            HandRank::RoyalFlush
        } else {
            HandRank::StraightFlush(high_card)
        };
    }

    // 已排序，相邻去重即可得到 (出现次数, 点数)；再按次数、点数从大到小排
    let groups: Vec<(usize, Rank)> = ranks
        .iter()
        .dedup_with_count()
        .map(|(n, &r)| (n, r))
        .sorted_by(|a, b| b.cmp(a))
        .collect();

    match (groups[0].0, groups.get(1).map(|g| g.0)) {
        (4, _) => HandRank::FourOfAKind(groups[0].1, groups[1].1),
        (3, Some(2)) => HandRank::FullHouse(groups[0].1, groups[1].1),
        (3, _) => HandRank::ThreeOfAKind(groups[0].1, groups[1].1, groups[2].1),
        (2, Some(2)) => HandRank::TwoPair(groups[0].1, groups[1].1, groups[2].1),
        (2, _) => HandRank::OnePair(groups[0].1, groups[1].1, groups[2].1, groups[3].1),
        _ if is_flush => HandRank::Flush(ranks[0], ranks[1], ranks[2], ranks[3], ranks[4]),
        _ if is_straight => HandRank::Straight(high_card),
        _ => HandRank::HighCard(ranks[0], ranks[1], ranks[2], ranks[3], ranks[4]),
    }
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;
    use Rank::*;

    // 辅助函数："AS KD 2C" -> Vec<Card>
    fn cards(s: &str) -> Vec<Card> {
        s.split_whitespace().map(|c| c.parse().unwrap()).collect()
    }

    fn eval(s: &str) -> HandRank {
        evaluate_5_card_hand(&cards(s))
    }

    // --- 5张牌评估测试 ---
    #[test]
    fn test_royal_flush() {
        assert_eq!(eval("TS AS QS KS JS"), HandRank::RoyalFlush);
    }

    #[test]
    fn test_ace_low_straight_flush() {
        assert_eq!(eval("AC 2C 3C 4C 5C"), HandRank::StraightFlush(Five));
    }

    #[test]
    fn test_four_of_a_kind() {
        assert_eq!(eval("AS AH AD AC KS"), HandRank::FourOfAKind(Ace, King));
    }

    #[test]
    fn test_full_house() {
        assert_eq!(eval("QC KS KH QS KD"), HandRank::FullHouse(King, Queen));
    }

    #[test]
    fn test_flush_keeps_all_kickers() {
        assert_eq!(eval("2D 5D 8D JD AD"), HandRank::Flush(Ace, Jack, Eight, Five, Two));
    }

    #[test]
    fn test_ace_low_straight() {
        assert_eq!(eval("AS 2H 3D 4C 5S"), HandRank::Straight(Five));
    }

    #[test]
    fn test_pairs_and_trips() {
        assert_eq!(eval("TS TH TD JC 2S"), HandRank::ThreeOfAKind(Ten, Jack, Two));
        assert_eq!(eval("JS JH 9D 9C TS"), HandRank::TwoPair(Jack, Nine, Ten));
        assert_eq!(eval("AS AH KD QC JS"), HandRank::OnePair(Ace, King, Queen, Jack));
        assert_eq!(eval("KS QH JD 9C 7S"), HandRank::HighCard(King, Queen, Jack, Nine, Seven));
    }

    // --- 7选5评估测试 ---

    #[test]
    fn test_best_hand_from_seven_prefers_flush_over_pair() {
        let seven = cards("AH KH TH 2H 5H AS TC");
        assert_eq!(find_best_hand(&seven), Some(HandRank::Flush(Ace, King, Ten, Five, Two)));
    }

    #[test]
    fn test_best_hand_from_seven_plays_the_board() {
        let seven = cards("2S 2H TC JD QH KS AC");
        assert_eq!(find_best_hand(&seven), Some(HandRank::Straight(Ace)));
    }

    #[test]
    fn test_best_hand_rejects_wrong_card_count() {
        assert_eq!(find_best_hand(&cards("AS KS QS JS")), None);
        assert_eq!(find_best_hand(&cards("AS KS QS JS TS 9S 8S 7S")), None);
    }

    #[test]
    fn test_best_hand_is_order_independent() {
        let mut seven = cards("9C 9D 4H 4S KD 2C 7H");
        let expected = find_best_hand(&seven);
        seven.reverse();
        assert_eq!(find_best_hand(&seven), expected);
        assert_eq!(expected, Some(HandRank::TwoPair(Nine, Four, King)));
    }

    // --- 牌力比较测试 ---
    #[test]
    fn test_rank_comparison() {
        assert!(HandRank::RoyalFlush > HandRank::StraightFlush(King));
        assert!(HandRank::StraightFlush(Five) > HandRank::FourOfAKind(Ace, King));
        assert!(HandRank::FullHouse(King, Two) > HandRank::FullHouse(Queen, Ace));
        assert!(HandRank::Flush(King, Jack, Ten, Five, Two) > HandRank::Flush(Queen, Jack, Ten, Five, Two));
        assert!(HandRank::OnePair(Ace, King, Nine, Three) > HandRank::OnePair(Ace, King, Nine, Two));
        assert!(HandRank::Straight(Six) > HandRank::Straight(Five));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(HandRank::Flush(Ace, Jack, Eight, Five, Two).to_string(), "Flush, Ace high");
        assert_eq!(HandRank::OnePair(Six, Ace, King, Two).to_string(), "Pair of Sixes");
        assert_eq!(HandRank::FullHouse(King, Queen).to_string(), "Full House, Kings over Queens");
        assert_eq!(HandRank::RoyalFlush.to_string(), "Royal Flush");
    }

    #[test]
    fn test_parse_and_display() {
        let card: Card = "td".parse().unwrap();
        assert_eq!(card, Card::new(Ten, Suit::Diamond));
        assert_eq!(card.to_string(), "T♦");
        assert_eq!("A♠".parse::<Card>(), Ok(Card::new(Ace, Suit::Spade)));
        assert_eq!("1S".parse::<Card>(), Err(ParseCardError::BadRank('1')));
        assert_eq!("AX".parse::<Card>(), Err(ParseCardError::BadSuit('X')));
        assert!(matches!("10S".parse::<Card>(), Err(ParseCardError::BadLength(_))));
    }

    // --- 牌堆测试 ---
    #[test]
    fn test_deck_has_52_distinct_cards() {
        let mut deck = Deck::shuffled(&mut StdRng::seed_from_u64(7));
        let all = deck.deal(Deck::SIZE).unwrap();
        assert_eq!(all.iter().collect::<HashSet<_>>().len(), 52);
        assert_eq!(deck.remaining(), 0);
        assert_eq!(deck.deal(1), None);
    }

    #[test]
    fn test_deck_shuffle_is_seeded() {
        let a = Deck::shuffled(&mut StdRng::seed_from_u64(42)).deal(10);
        let b = Deck::shuffled(&mut StdRng::seed_from_u64(42)).deal(10);
        assert_eq!(a, b);
        assert_ne!(a, Deck::ordered().deal(10));
    }
}
