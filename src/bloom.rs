//! Filtre de Bloom pour le test d'appartenance des adresses IP
//!
//! Le filtre sert de pré-test probabiliste avant la vérification exacte
//! contre l'ensemble de la liste noire: un résultat négatif est définitif,
//! un résultat positif doit être confirmé.

use bitvec::prelude::*;
use std::f64::consts::LN_2;
use std::io::Cursor;
use thiserror::Error;

/// Probabilité de faux positif par défaut
pub const DEFAULT_FP_PROB: f64 = 0.01;

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("le nombre d'éléments attendus doit être strictement positif")]
    InvalidCapacity,
    #[error("la probabilité de faux positif doit être dans l'intervalle (0, 1): {0}")]
    InvalidProbability(f64),
}

/// Filtre de Bloom à taille fixe sur des clés binaires
///
/// Les paramètres `m` (taille du tableau de bits) et `k` (nombre de
/// fonctions de hachage) sont dérivés de façon déterministe du couple
/// `(n, p)` à la construction et ne changent jamais: le filtre n'est pas
/// redimensionnable. Aucun faux négatif n'est possible; le taux de faux
/// positifs est borné par `p` tant que le filtre reçoit au plus `n` clés.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: BitVec<u8, Lsb0>,
    size: u64,
    hash_count: u32,
    items_count: usize,
    fp_prob: f64,
}

impl BloomFilter {
    /// Construit un filtre dimensionné pour `items_count` clés avec une
    /// probabilité de faux positif cible `fp_prob`
    pub fn new(items_count: usize, fp_prob: f64) -> Result<Self, FilterError> {
        if items_count == 0 {
            return Err(FilterError::InvalidCapacity);
        }
        if !(fp_prob > 0.0 && fp_prob < 1.0) {
            return Err(FilterError::InvalidProbability(fp_prob));
        }

        let size = optimal_size(items_count, fp_prob);
        let hash_count = optimal_hash_count(size, items_count);

        Ok(Self {
            bits: bitvec![u8, Lsb0; 0; size as usize],
            size,
            hash_count,
            items_count,
            fp_prob,
        })
    }

    /// Construit un filtre avec la probabilité de faux positif par défaut
    pub fn with_default_prob(items_count: usize) -> Result<Self, FilterError> {
        Self::new(items_count, DEFAULT_FP_PROB)
    }

    /// Insère une clé; l'opération est irréversible
    pub fn add(&mut self, key: &[u8]) {
        for position in hash_positions(key, self.hash_count, self.size) {
            self.bits.set(position, true);
        }
    }

    /// Teste l'appartenance probable d'une clé
    ///
    /// `false` signifie que la clé est définitivement absente. `true`
    /// signifie qu'elle est probablement présente et doit être confirmée
    /// par une vérification exacte.
    pub fn check(&self, key: &[u8]) -> bool {
        hash_positions(key, self.hash_count, self.size)
            .into_iter()
            .all(|position| self.bits[position])
    }

    /// Alias de `check` pour les expressions d'appartenance
    pub fn contains(&self, key: &[u8]) -> bool {
        self.check(key)
    }

    /// Taille du tableau de bits (m)
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Nombre de fonctions de hachage (k)
    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// Nombre d'éléments pour lequel le filtre a été dimensionné
    pub fn items_count(&self) -> usize {
        self.items_count
    }

    /// Probabilité de faux positif cible
    pub fn fp_prob(&self) -> f64 {
        self.fp_prob
    }
}

// Les k positions d'une clé: une même famille murmur3 variée par la graine
// 0..k, chaque valeur réduite modulo m
fn hash_positions(key: &[u8], hash_count: u32, size: u64) -> Vec<usize> {
    (0..hash_count)
        .map(|seed| {
            let hash = murmur3::murmur3_x64_128(&mut Cursor::new(key), seed).unwrap_or(0);
            (hash as u64 % size) as usize
        })
        .collect()
}

/// Taille optimale du tableau de bits: m = ⌈-n·ln(p) / ln(2)²⌉
fn optimal_size(items_count: usize, fp_prob: f64) -> u64 {
    let n = items_count as f64;
    (-(n * fp_prob.ln()) / (LN_2 * LN_2)).ceil() as u64
}

/// Nombre optimal de fonctions de hachage: k = ⌊(m/n)·ln(2)⌉, au moins 1
fn optimal_hash_count(size: u64, items_count: usize) -> u32 {
    let k = ((size as f64 / items_count as f64) * LN_2).round() as u32;
    k.max(1)
}
