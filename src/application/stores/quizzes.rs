use crate::cache::{CacheStore, StoreIndexes};
use crate::domain::entities::{Pool, PoolEvent, Problem, ProblemEvent, Quiz, QuizEvent};

#[derive(Debug, Default)]
pub struct QuizIndexes;

impl StoreIndexes for QuizIndexes {
    type Object = Quiz;
    type Event = QuizEvent;

    const NAME: &'static str = "quizzes";

    fn index(&mut self, _quiz: &Quiz) {}

    fn unindex(&mut self, _quiz: &Quiz) {}
}

pub type QuizStore<D> = CacheStore<QuizIndexes, D>;

#[derive(Debug, Default)]
pub struct PoolIndexes;

impl StoreIndexes for PoolIndexes {
    type Object = Pool;
    type Event = PoolEvent;

    const NAME: &'static str = "pools";

    fn index(&mut self, _pool: &Pool) {}

    fn unindex(&mut self, _pool: &Pool) {}
}

pub type PoolStore<D> = CacheStore<PoolIndexes, D>;

#[derive(Debug, Default)]
pub struct ProblemIndexes;

impl StoreIndexes for ProblemIndexes {
    type Object = Problem;
    type Event = ProblemEvent;

    const NAME: &'static str = "problems";

    fn index(&mut self, _problem: &Problem) {}

    fn unindex(&mut self, _problem: &Problem) {}
}

pub type ProblemStore<D> = CacheStore<ProblemIndexes, D>;
